//! Polynomials with exact rational coefficients.
//!
//! Arithmetic is checked: every operation that may overflow returns `None`
//! instead of panicking, so callers can degrade to an "unknown" answer.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::ScopeError;
use super::scope::{Translation, Var};
use crate::time::Rational;

/// A product of variables, kept sorted. The empty monomial is the constant 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Monomial(Vec<Var>);

impl Monomial {
    pub fn one() -> Self {
        Monomial(Vec::new())
    }

    pub fn of(var: Var) -> Self {
        Monomial(vec![var])
    }

    pub fn degree(&self) -> usize {
        self.0.len()
    }

    pub fn vars(&self) -> &[Var] {
        &self.0
    }

    fn times(&self, other: &Monomial) -> Monomial {
        let mut vars = Vec::with_capacity(self.0.len() + other.0.len());
        vars.extend_from_slice(&self.0);
        vars.extend_from_slice(&other.0);
        vars.sort_unstable();
        Monomial(vars)
    }
}

/// Sparse polynomial; zero coefficients are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, Rational>,
}

impl Poly {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: Rational) -> Self {
        let mut p = Self::zero();
        p.push(Monomial::one(), value);
        p
    }

    pub fn var(var: Var) -> Self {
        let mut p = Self::zero();
        p.push(Monomial::of(var), Rational::ONE);
        p
    }

    fn push(&mut self, monomial: Monomial, coeff: Rational) {
        if !coeff.is_zero() {
            self.terms.insert(monomial, coeff);
        }
    }

    fn accumulate(&mut self, monomial: Monomial, coeff: Rational) -> Option<()> {
        let sum = match self.terms.get(&monomial) {
            Some(existing) => existing.checked_add(&coeff)?,
            None => coeff,
        };
        if sum.is_zero() {
            self.terms.remove(&monomial);
        } else {
            self.terms.insert(monomial, sum);
        }
        Some(())
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// The value of a polynomial without variables.
    pub fn as_constant(&self) -> Option<Rational> {
        match self.terms.len() {
            0 => Some(Rational::ZERO),
            1 => self.terms.get(&Monomial::one()).copied(),
            _ => None,
        }
    }

    pub fn constant_term(&self) -> Rational {
        self.terms
            .get(&Monomial::one())
            .copied()
            .unwrap_or(Rational::ZERO)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &Rational)> {
        self.terms.iter()
    }

    pub fn degree(&self) -> usize {
        self.terms.keys().map(Monomial::degree).max().unwrap_or(0)
    }

    pub fn is_linear(&self) -> bool {
        self.degree() <= 1
    }

    pub fn vars(&self) -> BTreeSet<Var> {
        self.terms
            .keys()
            .flat_map(|m| m.vars().iter().copied())
            .collect()
    }

    pub fn mentions(&self, var: Var) -> bool {
        self.terms.keys().any(|m| m.vars().contains(&var))
    }

    /// Coefficient of the degree-one term in `var`.
    pub fn linear_coeff(&self, var: Var) -> Rational {
        self.terms
            .get(&Monomial::of(var))
            .copied()
            .unwrap_or(Rational::ZERO)
    }

    /// True when `var` occurs only in its degree-one term, with a non-zero
    /// coefficient.
    pub fn is_linear_in(&self, var: Var) -> bool {
        let solo = Monomial::of(var);
        self.terms.contains_key(&solo)
            && self
                .terms
                .keys()
                .all(|m| *m == solo || !m.vars().contains(&var))
    }

    pub fn checked_add(&self, other: &Poly) -> Option<Poly> {
        let mut out = self.clone();
        for (m, c) in &other.terms {
            out.accumulate(m.clone(), *c)?;
        }
        Some(out)
    }

    pub fn checked_neg(&self) -> Option<Poly> {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            out.push(m.clone(), c.checked_neg()?);
        }
        Some(out)
    }

    pub fn checked_sub(&self, other: &Poly) -> Option<Poly> {
        self.checked_add(&other.checked_neg()?)
    }

    pub fn checked_scale(&self, factor: Rational) -> Option<Poly> {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            out.push(m.clone(), c.checked_mul(&factor)?);
        }
        Some(out)
    }

    pub fn checked_mul(&self, other: &Poly) -> Option<Poly> {
        let mut out = Poly::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                out.accumulate(m1.times(m2), c1.checked_mul(c2)?)?;
            }
        }
        Some(out)
    }

    /// Replaces every occurrence of `var` by `replacement`.
    pub fn substitute(&self, var: Var, replacement: &Poly) -> Option<Poly> {
        if !self.mentions(var) {
            return Some(self.clone());
        }
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let rest: Vec<Var> = m.vars().iter().copied().filter(|v| *v != var).collect();
            let power = m.degree() - rest.len();
            let mut term = Poly::zero();
            term.push(Monomial(rest), *c);
            for _ in 0..power {
                term = term.checked_mul(replacement)?;
            }
            out = out.checked_add(&term)?;
        }
        Some(out)
    }

    pub fn rebind(&self, translation: &Translation) -> Result<Poly, ScopeError> {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let vars = m
                .vars()
                .iter()
                .map(|v| translation.rebind_var(*v))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(Monomial(vars), *c);
        }
        Ok(out)
    }
}

impl From<Rational> for Poly {
    fn from(value: Rational) -> Self {
        Poly::constant(value)
    }
}

impl From<Var> for Poly {
    fn from(var: Var) -> Self {
        Poly::var(var)
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("0");
        }
        for (i, (m, c)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" + ")?;
            }
            if m.degree() == 0 {
                write!(f, "{c}")?;
                continue;
            }
            if *c != Rational::ONE {
                write!(f, "{c}*")?;
            }
            let names: Vec<String> = m.vars().iter().map(ToString::to_string).collect();
            f.write_str(&names.join("*"))?;
        }
        Ok(())
    }
}

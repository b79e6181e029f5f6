//! Quantifier-free formulas over polynomial atoms.

use std::collections::BTreeSet;
use std::fmt;

use super::error::ScopeError;
use super::poly::Poly;
use super::scope::{Translation, Var};

/// Relation of an atom `poly ⋈ 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rel {
    Eq,
    Le,
    Lt,
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rel::Eq => "=",
            Rel::Le => "<=",
            Rel::Lt => "<",
        })
    }
}

/// `poly ⋈ 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub poly: Poly,
    pub rel: Rel,
}

impl Atom {
    /// Truth value of an atom without variables.
    pub fn decide(&self) -> Option<bool> {
        let c = self.poly.as_constant()?;
        Some(match self.rel {
            Rel::Eq => c.is_zero(),
            Rel::Le => !c.is_positive(),
            Rel::Lt => c.is_negative(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

/// Why a formula could not be brought into disjunctive normal form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    TooManyDisjuncts,
    Overflow,
}

/// A conjunction of atoms.
pub type Conjunct = Vec<Atom>;

impl Formula {
    /// Builds `poly ⋈ 0`, folding constant atoms.
    pub fn atom(poly: Poly, rel: Rel) -> Formula {
        let atom = Atom { poly, rel };
        match atom.decide() {
            Some(true) => Formula::True,
            Some(false) => Formula::False,
            None => Formula::Atom(atom),
        }
    }

    pub fn eq(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Some(Formula::atom(lhs.checked_sub(rhs)?, Rel::Eq))
    }

    pub fn ne(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Some(Formula::eq(lhs, rhs)?.not())
    }

    pub fn lt(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Some(Formula::atom(lhs.checked_sub(rhs)?, Rel::Lt))
    }

    pub fn le(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Some(Formula::atom(lhs.checked_sub(rhs)?, Rel::Le))
    }

    pub fn gt(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Formula::lt(rhs, lhs)
    }

    pub fn ge(lhs: &Poly, rhs: &Poly) -> Option<Formula> {
        Formula::le(rhs, lhs)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::False)
    }

    /// Conjunction of all parts, flattened and simplified.
    pub fn all(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    /// Disjunction of all parts, flattened and simplified.
    pub fn any(parts: impl IntoIterator<Item = Formula>) -> Formula {
        let mut out = Vec::new();
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    pub fn and(self, other: Formula) -> Formula {
        Formula::all([self, other])
    }

    pub fn or(self, other: Formula) -> Formula {
        Formula::any([self, other])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Exactly one of `a` and `b` holds.
    pub fn xor(a: Formula, b: Formula) -> Formula {
        Formula::any([
            a.clone().and(b.clone().not()),
            a.not().and(b),
        ])
    }

    /// Negation normal form: negations are pushed into the atoms.
    ///
    /// `¬(p = 0)` becomes `p < 0 ∨ -p < 0`.
    pub fn nnf(&self) -> Option<Formula> {
        self.nnf_with(false)
    }

    fn nnf_with(&self, negate: bool) -> Option<Formula> {
        Some(match (self, negate) {
            (Formula::True, false) | (Formula::False, true) => Formula::True,
            (Formula::True, true) | (Formula::False, false) => Formula::False,
            (Formula::Not(inner), _) => inner.nnf_with(!negate)?,
            (Formula::And(parts), false) | (Formula::Or(parts), true) => Formula::all(
                parts
                    .iter()
                    .map(|p| p.nnf_with(negate))
                    .collect::<Option<Vec<_>>>()?,
            ),
            (Formula::Or(parts), false) | (Formula::And(parts), true) => Formula::any(
                parts
                    .iter()
                    .map(|p| p.nnf_with(negate))
                    .collect::<Option<Vec<_>>>()?,
            ),
            (Formula::Atom(atom), false) => Formula::Atom(atom.clone()),
            (Formula::Atom(atom), true) => {
                let neg = atom.poly.checked_neg()?;
                match atom.rel {
                    Rel::Lt => Formula::atom(neg, Rel::Le),
                    Rel::Le => Formula::atom(neg, Rel::Lt),
                    Rel::Eq => Formula::any([
                        Formula::atom(atom.poly.clone(), Rel::Lt),
                        Formula::atom(neg, Rel::Lt),
                    ]),
                }
            }
        })
    }

    /// Disjunctive normal form, giving up once more than `limit` conjuncts
    /// would be produced.
    pub fn dnf(&self, limit: usize) -> Result<Vec<Conjunct>, Expansion> {
        let nnf = self.nnf().ok_or(Expansion::Overflow)?;
        expand(&nnf, limit)
    }

    pub fn vars(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<Var>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(atom) => out.extend(atom.poly.vars()),
            Formula::Not(inner) => inner.collect_vars(out),
            Formula::And(parts) | Formula::Or(parts) => {
                for p in parts {
                    p.collect_vars(out);
                }
            }
        }
    }

    /// Re-binds every variable reference into the translation's target scope.
    pub fn rebind(&self, translation: &Translation) -> Result<Formula, ScopeError> {
        Ok(match self {
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Atom(atom) => Formula::Atom(Atom {
                poly: atom.poly.rebind(translation)?,
                rel: atom.rel,
            }),
            Formula::Not(inner) => Formula::Not(Box::new(inner.rebind(translation)?)),
            Formula::And(parts) => Formula::And(
                parts
                    .iter()
                    .map(|p| p.rebind(translation))
                    .collect::<Result<_, _>>()?,
            ),
            Formula::Or(parts) => Formula::Or(
                parts
                    .iter()
                    .map(|p| p.rebind(translation))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

fn expand(formula: &Formula, limit: usize) -> Result<Vec<Conjunct>, Expansion> {
    match formula {
        Formula::True => Ok(vec![Vec::new()]),
        Formula::False => Ok(Vec::new()),
        Formula::Atom(atom) => Ok(vec![vec![atom.clone()]]),
        // nnf leaves no negation behind
        Formula::Not(inner) => expand(&inner.nnf_with(true).ok_or(Expansion::Overflow)?, limit),
        Formula::Or(parts) => {
            let mut out = Vec::new();
            for part in parts {
                out.extend(expand(part, limit)?);
                if out.len() > limit {
                    return Err(Expansion::TooManyDisjuncts);
                }
            }
            Ok(out)
        }
        Formula::And(parts) => {
            let mut acc: Vec<Conjunct> = vec![Vec::new()];
            for part in parts {
                let rhs = expand(part, limit)?;
                if acc.len().saturating_mul(rhs.len()) > limit {
                    return Err(Expansion::TooManyDisjuncts);
                }
                let mut next = Vec::with_capacity(acc.len() * rhs.len());
                for lhs in &acc {
                    for r in &rhs {
                        let mut conj = lhs.clone();
                        conj.extend(r.iter().cloned());
                        next.push(conj);
                    }
                }
                acc = next;
            }
            Ok(acc)
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, parts: &[Formula], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(")")
        }

        match self {
            Formula::True => f.write_str("true"),
            Formula::False => f.write_str("false"),
            Formula::Atom(atom) => write!(f, "{} {} 0", atom.poly, atom.rel),
            Formula::Not(inner) => write!(f, "!{inner}"),
            Formula::And(parts) => join(f, parts, " && "),
            Formula::Or(parts) => join(f, parts, " || "),
        }
    }
}

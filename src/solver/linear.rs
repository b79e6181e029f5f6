//! Exact decision procedure for linear rational arithmetic.
//!
//! Each disjunct of the problem's DNF is solved independently:
//!
//! 1. equalities that are linear in a variable other than `dt` are solved for
//!    that variable and substituted away;
//! 2. the remaining atoms must be linear, otherwise the disjunct is unknown;
//! 3. Fourier–Motzkin elimination projects the rows onto `dt`, tracking
//!    strictness so that open boundaries survive;
//! 4. the projected interval of `dt` yields the infimum.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::problem::{Backend, Optimum, Problem, Satisfiability};
use crate::symbolic::{Atom, Expansion, Formula, Poly, Rel, Var};
use crate::time::{Epsilon, Rational, TimeDomain};

const OVERFLOW: &str = "arithmetic overflow";
const DEADLINE: &str = "deadline expired";

/// Built-in backend for linear problems. Non-linear residue, expansion
/// blow-up, overflow and deadline expiry are reported as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackend {
    max_disjuncts: usize,
    max_rows: usize,
}

impl Default for LinearBackend {
    fn default() -> Self {
        Self {
            max_disjuncts: 256,
            max_rows: 4096,
        }
    }
}

impl LinearBackend {
    pub fn new(max_disjuncts: usize, max_rows: usize) -> Self {
        Self {
            max_disjuncts,
            max_rows,
        }
    }

    pub fn max_disjuncts(&self) -> usize {
        self.max_disjuncts
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn regions(&self, problem: &Problem) -> Result<Vec<Region>, String> {
        let conjunction = Formula::all(problem.assertions().iter().cloned());
        let disjuncts = conjunction.dnf(self.max_disjuncts).map_err(|e| match e {
            Expansion::TooManyDisjuncts => {
                format!("more than {} disjuncts", self.max_disjuncts)
            }
            Expansion::Overflow => OVERFLOW.to_string(),
        })?;
        trace!(disjuncts = disjuncts.len(), "expanded problem");
        Ok(disjuncts
            .into_iter()
            .map(|conj| self.solve_conjunct(conj, problem))
            .collect())
    }

    fn solve_conjunct(&self, atoms: Vec<Atom>, problem: &Problem) -> Region {
        let dt = problem.dt();
        let atoms = match eliminate_equalities(atoms, dt, problem) {
            Ok(Some(atoms)) => atoms,
            Ok(None) => return Region::Empty,
            Err(reason) => return Region::Unknown(reason),
        };
        if atoms.iter().any(|a| !a.poly.is_linear()) {
            return Region::Unknown("non-linear constraint".to_string());
        }

        let mut rows = Vec::with_capacity(atoms.len());
        for atom in &atoms {
            match Row::from_atom(atom) {
                Some(r) => rows.extend(r),
                None => return Region::Unknown(OVERFLOW.to_string()),
            }
        }

        let others: BTreeSet<Var> = rows
            .iter()
            .flat_map(|r| r.coeffs.keys().copied())
            .filter(|v| *v != dt)
            .collect();
        for var in others {
            if problem.expired() {
                return Region::Unknown(DEADLINE.to_string());
            }
            rows = match fourier_motzkin(rows, var) {
                Some(rows) => rows,
                None => return Region::Unknown(OVERFLOW.to_string()),
            };
            if rows.len() > self.max_rows {
                return Region::Unknown(format!("more than {} rows", self.max_rows));
            }
            if rows.iter().any(Row::is_contradiction) {
                return Region::Empty;
            }
        }
        if rows.iter().any(Row::is_contradiction) {
            return Region::Empty;
        }

        match project(&rows, dt) {
            Some(interval) if interval.is_empty() => Region::Empty,
            Some(interval) => Region::Interval(interval),
            None => Region::Unknown(OVERFLOW.to_string()),
        }
    }
}

impl Backend for LinearBackend {
    fn name(&self) -> &str {
        "linear"
    }

    fn optimize(&self, problem: &Problem) -> Optimum {
        let regions = match self.regions(problem) {
            Ok(regions) => regions,
            Err(reason) => return Optimum::Unknown(reason),
        };
        let mut best: Option<Epsilon> = None;
        let mut unbounded = false;
        for region in regions {
            match region {
                Region::Empty => {}
                // an unknown disjunct may hide a smaller value
                Region::Unknown(reason) => return Optimum::Unknown(reason),
                Region::Interval(interval) => match interval.infimum(problem.domain()) {
                    Infimum::Unbounded => unbounded = true,
                    Infimum::Empty => {}
                    Infimum::Overflow => return Optimum::Unknown(OVERFLOW.to_string()),
                    Infimum::At(value) => {
                        best = Some(best.map_or(value, |b| b.min(value)));
                    }
                },
            }
        }
        match (unbounded, best) {
            (true, _) => Optimum::Unbounded,
            (false, Some(value)) => Optimum::Optimal(value),
            (false, None) => Optimum::Infeasible,
        }
    }

    fn check(&self, problem: &Problem) -> Satisfiability {
        let regions = match self.regions(problem) {
            Ok(regions) => regions,
            Err(reason) => return Satisfiability::Unknown(reason),
        };
        let mut unknown = None;
        let mut witness: Option<Rational> = None;
        for region in regions {
            match region {
                Region::Empty => {}
                Region::Unknown(reason) => unknown = Some(reason),
                Region::Interval(interval) => match interval.witness(problem.domain()) {
                    Some(Some(w)) => witness = Some(witness.map_or(w, |b| b.min(w))),
                    Some(None) => {}
                    None => unknown = Some(OVERFLOW.to_string()),
                },
            }
        }
        match (witness, unknown) {
            (Some(w), _) => Satisfiability::Sat(w),
            (None, Some(reason)) => Satisfiability::Unknown(reason),
            (None, None) => Satisfiability::Unsat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Region {
    Empty,
    Interval(Interval),
    Unknown(String),
}

/// Solves and substitutes equalities on variables other than `dt`.
///
/// `Ok(None)` means a constant atom turned out false.
fn eliminate_equalities(
    mut atoms: Vec<Atom>,
    dt: Var,
    problem: &Problem,
) -> Result<Option<Vec<Atom>>, String> {
    loop {
        if problem.expired() {
            return Err(DEADLINE.to_string());
        }
        let mut kept = Vec::with_capacity(atoms.len());
        for atom in atoms {
            match atom.decide() {
                Some(true) => {}
                Some(false) => return Ok(None),
                None => kept.push(atom),
            }
        }
        atoms = kept;

        let pick = atoms.iter().enumerate().find_map(|(i, a)| {
            if a.rel != Rel::Eq {
                return None;
            }
            a.poly
                .vars()
                .into_iter()
                .find(|v| *v != dt && a.poly.is_linear_in(*v))
                .map(|v| (i, v))
        });
        let Some((index, var)) = pick else {
            return Ok(Some(atoms));
        };

        let eq = atoms.swap_remove(index);
        let replacement = solve_for(&eq.poly, var).ok_or_else(|| OVERFLOW.to_string())?;
        atoms = atoms
            .into_iter()
            .map(|a| {
                a.poly.substitute(var, &replacement).map(|poly| Atom { poly, rel: a.rel })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| OVERFLOW.to_string())?;
    }
}

/// From `c·var + rest = 0`, returns `-rest / c`.
fn solve_for(poly: &Poly, var: Var) -> Option<Poly> {
    let c = poly.linear_coeff(var);
    let rest = poly.checked_sub(&Poly::var(var).checked_scale(c)?)?;
    let factor = Rational::ONE.checked_neg()?.checked_div(&c)?;
    rest.checked_scale(factor)
}

/// `Σ coeffs·var + constant < 0` (strict) or `<= 0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Row {
    coeffs: BTreeMap<Var, Rational>,
    constant: Rational,
    strict: bool,
}

impl Row {
    fn from_poly(poly: &Poly, strict: bool) -> Self {
        let mut coeffs = BTreeMap::new();
        let mut constant = Rational::ZERO;
        for (m, c) in poly.terms() {
            match m.vars() {
                [] => constant = *c,
                [v] => {
                    coeffs.insert(*v, *c);
                }
                // callers only pass linear polynomials
                _ => {}
            }
        }
        Row {
            coeffs,
            constant,
            strict,
        }
    }

    fn from_atom(atom: &Atom) -> Option<Vec<Row>> {
        Some(match atom.rel {
            Rel::Lt => vec![Row::from_poly(&atom.poly, true)],
            Rel::Le => vec![Row::from_poly(&atom.poly, false)],
            Rel::Eq => vec![
                Row::from_poly(&atom.poly, false),
                Row::from_poly(&atom.poly.checked_neg()?, false),
            ],
        })
    }

    fn is_contradiction(&self) -> bool {
        self.coeffs.is_empty()
            && if self.strict {
                !self.constant.is_negative()
            } else {
                self.constant.is_positive()
            }
    }

    fn is_tautology(&self) -> bool {
        self.coeffs.is_empty() && !self.is_contradiction()
    }

    fn scaled(&self, factor: Rational) -> Option<Row> {
        let mut coeffs = BTreeMap::new();
        for (v, c) in &self.coeffs {
            coeffs.insert(*v, c.checked_mul(&factor)?);
        }
        Some(Row {
            coeffs,
            constant: self.constant.checked_mul(&factor)?,
            strict: self.strict,
        })
    }

    fn plus(&self, other: &Row) -> Option<Row> {
        let mut coeffs = self.coeffs.clone();
        for (v, c) in &other.coeffs {
            let sum = match coeffs.get(v) {
                Some(existing) => existing.checked_add(c)?,
                None => *c,
            };
            if sum.is_zero() {
                coeffs.remove(v);
            } else {
                coeffs.insert(*v, sum);
            }
        }
        Some(Row {
            coeffs,
            constant: self.constant.checked_add(&other.constant)?,
            strict: self.strict || other.strict,
        })
    }

    /// Scales so that the first coefficient has magnitude one.
    fn normalized(self) -> Option<Row> {
        match self.coeffs.values().next() {
            Some(c) => {
                let factor = Rational::ONE.checked_div(&c.abs())?;
                self.scaled(factor)
            }
            None => Some(self),
        }
    }
}

fn fourier_motzkin(rows: Vec<Row>, var: Var) -> Option<Vec<Row>> {
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    let mut out = BTreeSet::new();
    for row in rows {
        match row.coeffs.get(&var) {
            Some(c) if c.is_positive() => upper.push(row),
            Some(_) => lower.push(row),
            None => {
                out.insert(row);
            }
        }
    }
    for up in &upper {
        let cu = up.coeffs.get(&var).copied().unwrap_or(Rational::ONE);
        for lo in &lower {
            let cl = lo.coeffs.get(&var).copied().unwrap_or(Rational::ONE);
            // up·|cl| + lo·cu cancels `var`
            let mut combined = up.scaled(cl.abs())?.plus(&lo.scaled(cu)?)?;
            combined.coeffs.remove(&var);
            let combined = combined.normalized()?;
            if !combined.is_tautology() {
                out.insert(combined);
            }
        }
    }
    Some(out.into_iter().collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bound {
    value: Rational,
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

enum Infimum {
    At(Epsilon),
    Unbounded,
    Empty,
    Overflow,
}

/// Reads the bounds on `dt` off rows that mention nothing else.
fn project(rows: &[Row], dt: Var) -> Option<Interval> {
    let mut interval = Interval::default();
    for row in rows {
        let Some(c) = row.coeffs.get(&dt) else {
            continue;
        };
        let value = row.constant.checked_neg()?.checked_div(c)?;
        let bound = Bound {
            value,
            strict: row.strict,
        };
        if c.is_positive() {
            interval.upper = Some(match interval.upper {
                Some(u) if u.value < value || (u.value == value && u.strict) => u,
                _ => bound,
            });
        } else {
            interval.lower = Some(match interval.lower {
                Some(l) if l.value > value || (l.value == value && l.strict) => l,
                _ => bound,
            });
        }
    }
    Some(interval)
}

impl Interval {
    fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) => {
                l.value > u.value || (l.value == u.value && (l.strict || u.strict))
            }
            _ => false,
        }
    }

    fn admits(&self, value: Rational) -> bool {
        self.upper
            .map_or(true, |u| value < u.value || (value == u.value && !u.strict))
    }

    /// Smallest integer above the lower bound.
    fn integer_floor(lower: Bound) -> Option<Rational> {
        if lower.strict {
            lower.value.floor().checked_add(&Rational::ONE)
        } else {
            Some(lower.value.ceil())
        }
    }

    fn infimum(&self, domain: TimeDomain) -> Infimum {
        let Some(lower) = self.lower else {
            return Infimum::Unbounded;
        };
        match domain {
            TimeDomain::Rational if lower.strict => Infimum::At(Epsilon::just_after(lower.value)),
            TimeDomain::Rational => Infimum::At(Epsilon::exact(lower.value)),
            TimeDomain::Integer => match Self::integer_floor(lower) {
                Some(n) if self.admits(n) => Infimum::At(Epsilon::exact(n)),
                Some(_) => Infimum::Empty,
                None => Infimum::Overflow,
            },
        }
    }

    /// A value of `dt` inside the interval. `Some(None)` when the integer
    /// domain has no point in it, `None` on overflow.
    fn witness(&self, domain: TimeDomain) -> Option<Option<Rational>> {
        let candidate = match (domain, self.lower, self.upper) {
            (TimeDomain::Integer, Some(l), _) => Self::integer_floor(l)?,
            (TimeDomain::Integer, None, Some(u)) => {
                if u.strict && u.value.is_integer() {
                    u.value.checked_sub(&Rational::ONE)?
                } else {
                    u.value.floor()
                }
            }
            (TimeDomain::Integer, None, None) => Rational::ZERO,
            (TimeDomain::Rational, Some(l), _) if !l.strict => l.value,
            (TimeDomain::Rational, Some(l), Some(u)) => l
                .value
                .checked_add(&u.value)?
                .checked_div(&Rational::from_integer(2))?,
            (TimeDomain::Rational, Some(l), None) => l.value.checked_add(&Rational::ONE)?,
            (TimeDomain::Rational, None, Some(u)) if !u.strict => u.value,
            (TimeDomain::Rational, None, Some(u)) => u.value.checked_sub(&Rational::ONE)?,
            (TimeDomain::Rational, None, None) => Rational::ZERO,
        };
        Some(self.admits(candidate).then_some(candidate))
    }
}

use std::time::Instant;

use crate::symbolic::{Formula, Scope, ScopeError, ScopeId, Var};
use crate::time::{Epsilon, Rational, TimeDomain};

/// A set of assertions over one scope, minimizing the time variable `dt`.
#[derive(Debug, Clone)]
pub struct Problem {
    scope: ScopeId,
    dt: Var,
    domain: TimeDomain,
    deadline: Option<Instant>,
    assertions: Vec<Formula>,
}

impl Problem {
    /// Starts an empty problem in `scope` with objective `dt`.
    ///
    /// # Errors
    ///
    /// Returns `ForeignVariable` if `dt` does not belong to `scope`.
    pub fn new(scope: &Scope, dt: Var, domain: TimeDomain) -> Result<Self, ScopeError> {
        scope.check(dt)?;
        Ok(Self {
            scope: scope.id(),
            dt,
            domain,
            deadline: None,
            assertions: Vec::new(),
        })
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Adds an assertion.
    ///
    /// # Errors
    ///
    /// Rejects formulas mentioning a variable of any other scope; nothing is
    /// added in that case.
    pub fn assert(&mut self, formula: Formula) -> Result<(), ScopeError> {
        if let Some(var) = formula.vars().into_iter().find(|v| v.scope() != self.scope) {
            return Err(ScopeError::ForeignVariable {
                var,
                expected: self.scope,
            });
        }
        if !formula.is_true() {
            self.assertions.push(formula);
        }
        Ok(())
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn dt(&self) -> Var {
        self.dt
    }

    pub fn domain(&self) -> TimeDomain {
        self.domain
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn assertions(&self) -> &[Formula] {
        &self.assertions
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Result of minimizing `dt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimum {
    /// The infimum, with a positive epsilon part when it is not attained.
    Optimal(Epsilon),
    Unbounded,
    Infeasible,
    Unknown(String),
}

/// Result of a plain satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfiability {
    /// Satisfiable, with the value of `dt` in one model.
    Sat(Rational),
    Unsat,
    Unknown(String),
}

/// A decision procedure for [`Problem`]s.
///
/// Backends are shared by every worker of a query and must not keep mutable
/// state between calls.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn optimize(&self, problem: &Problem) -> Optimum;

    fn check(&self, problem: &Problem) -> Satisfiability;
}

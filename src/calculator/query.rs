//! Per-query state shared by every modifier calculation, and the pieces both
//! calculation kinds are assembled from.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::config::Isolation;
use super::error::CalcError;
use super::report::{Exactness, Outcome};
use super::{enabler, transition};
use crate::cache::ConstraintCache;
use crate::model::{ModifierId, Snapshot};
use crate::modifier_map::ModifierMap;
use crate::solver::{Backend, Optimum, Problem, Satisfiability};
use crate::symbolic::{Formula, Poly, Scope, ScopeError, Translation, Var};
use crate::time::{Epsilon, TimeDomain};

/// Frozen inputs of one query. Workers share it read-only.
pub(crate) struct Query {
    pub cache: Arc<ConstraintCache>,
    pub snapshot: Arc<Snapshot>,
    pub backend: Arc<dyn Backend>,
    pub domain: TimeDomain,
    pub isolation: Isolation,
    pub worker_deadline: Option<Duration>,
    pub max_workers: Option<usize>,
}

/// One unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    ConditionChange(ModifierId),
    Transition(ModifierId),
}

impl Task {
    pub fn modifier(&self) -> ModifierId {
        match self {
            Task::ConditionChange(id) | Task::Transition(id) => *id,
        }
    }
}

pub(crate) fn run_task(query: &Query, task: Task) -> Result<Outcome, CalcError> {
    match task {
        Task::ConditionChange(id) => enabler::condition_change(query, id),
        Task::Transition(id) => transition::transition_time(query, id),
    }
}

/// Solving scope of one calculation: the cache's own scope, or a fork of it
/// into which every cached formula is rebound before use.
pub(crate) struct Binding<'c> {
    cache: &'c ConstraintCache,
    forked: Option<(Scope, Translation)>,
}

impl<'c> Binding<'c> {
    pub fn new(cache: &'c ConstraintCache, isolation: Isolation) -> Self {
        let forked = match isolation {
            Isolation::Shared => None,
            Isolation::PerTask => Some(cache.scope().fork()),
        };
        Self { cache, forked }
    }

    pub fn scope(&self) -> &Scope {
        match &self.forked {
            Some((scope, _)) => scope,
            None => self.cache.scope(),
        }
    }

    pub fn var(&self, var: Var) -> Result<Var, ScopeError> {
        match &self.forked {
            Some((_, translation)) => translation.rebind_var(var),
            None => {
                self.cache.scope().check(var)?;
                Ok(var)
            }
        }
    }

    pub fn formula(&self, formula: &Formula) -> Result<Formula, ScopeError> {
        match &self.forked {
            Some((_, translation)) => formula.rebind(translation),
            None => Ok(formula.clone()),
        }
    }
}

/// Lower end of `dt` in a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeFloor {
    /// `dt > 0`: a branch flip strictly after the query instant.
    Positive,
    /// `dt >= 0`: a guard may already hold.
    NonNegative,
}

impl Query {
    /// Pins for the cache-scope `formulas`: every map source keeps its
    /// observed value (`current == pre`) and every pre-value mentioned is
    /// fixed to the snapshot.
    pub fn pins(&self, map: &ModifierMap, formulas: &[Formula]) -> Vec<Formula> {
        let mut pins = Vec::new();
        let mut pre_vars: BTreeSet<Var> = formulas.iter().flat_map(Formula::vars).collect();
        for port in map.sources() {
            if let Some(vars) = self.cache.port_vars(port) {
                if let Some(pin) = Formula::eq(&Poly::var(vars.current), &Poly::var(vars.pre)) {
                    pins.push(pin);
                }
                pre_vars.insert(vars.pre);
            }
        }
        for var in pre_vars {
            let Some(port) = self.cache.port_of_pre(var) else {
                continue;
            };
            let pin = self
                .snapshot
                .value(port)
                .and_then(|value| Formula::eq(&Poly::var(var), &Poly::constant(value)));
            if let Some(pin) = pin {
                pins.push(pin);
            }
        }
        pins
    }

    /// Assembles a problem in the binding's scope from cache-scope formulas.
    pub fn problem(
        &self,
        binding: &Binding<'_>,
        floor: TimeFloor,
        map: &ModifierMap,
        mut formulas: Vec<Formula>,
    ) -> Result<Problem, CalcError> {
        let pins = self.pins(map, &formulas);
        formulas.extend(pins);

        let dt = binding.var(self.cache.dt())?;
        let mut problem = Problem::new(binding.scope(), dt, self.domain)?;
        if let Some(at) = self.worker_deadline.and_then(|b| Instant::now().checked_add(b)) {
            problem = problem.with_deadline(at);
        }
        let zero = Poly::zero();
        let floor = match floor {
            TimeFloor::Positive => Formula::gt(&Poly::var(dt), &zero),
            TimeFloor::NonNegative => Formula::ge(&Poly::var(dt), &zero),
        };
        if let Some(floor) = floor {
            problem.assert(floor)?;
        }
        for formula in &formulas {
            problem.assert(binding.formula(formula)?)?;
        }
        if tracing::enabled!(tracing::Level::TRACE) {
            for formula in problem.assertions() {
                trace!(%formula, "assert");
            }
        }
        Ok(problem)
    }
}

/// Result of minimizing `dt` under the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Solved {
    At(Epsilon, Exactness),
    Never,
    Undecidable(String),
}

/// Optimizes; on an unknown answer retries with a plain satisfiability check
/// whose witness is accepted as a possibly non-minimal time.
pub(crate) fn solve_min(backend: &dyn Backend, problem: &Problem) -> Solved {
    match backend.optimize(problem) {
        Optimum::Optimal(time) => Solved::At(time, Exactness::Optimal),
        Optimum::Infeasible => Solved::Never,
        Optimum::Unbounded => Solved::Undecidable("objective unbounded".to_string()),
        Optimum::Unknown(reason) => {
            debug!(backend = backend.name(), %reason, "optimizer unknown, retrying as check");
            match backend.check(problem) {
                Satisfiability::Sat(witness) => {
                    Solved::At(Epsilon::exact(witness), Exactness::WitnessOnly)
                }
                Satisfiability::Unsat => Solved::Never,
                Satisfiability::Unknown(reason) => Solved::Undecidable(reason),
            }
        }
    }
}

//! Next-behaviour-change calculation.
//!
//! A query looks at every modifier that can change behaviour by time
//! passing alone:
//!
//! - branching influences, and branching updates of an active state, flip
//!   branch at the earliest `dt > 0` their condition-changed set allows;
//! - transitions out of an active state fire at the earliest `dt >= 0`
//!   their guard holds.
//!
//! Each is solved on its own (see [`Isolation`]) and reported as an
//! [`Outcome`]. The full candidate list is kept; [`earliest`] reduces it.
//!
//! # Example
//!
//! ```
//! use hybridtime::calculator::NextChangeCalculator;
//! use hybridtime::model::{dt, name, num, Function, System};
//! use hybridtime::time::{Epsilon, Rational};
//!
//! let mut sys = System::new("tank");
//! let root = sys.root();
//! let fill = sys.add_state(root, "fill").unwrap();
//! let full = sys.add_state(root, "full").unwrap();
//! let level = sys.add_port(root, "level", 5).unwrap();
//! let ramp = Function::returning(name("level_0") + dt());
//! sys.add_update(root, "rise", fill, level, ramp).unwrap();
//! sys.add_transition(root, "overflow", fill, full, name("level").ge(num(10))).unwrap();
//!
//! let calc = NextChangeCalculator::default();
//! let next = calc.next_behaviour_change(&sys).unwrap().unwrap();
//! assert_eq!(next.time, Epsilon::exact(Rational::from(5)));
//! ```

mod aggregate;
mod config;
mod enabler;
mod error;
mod parallel;
mod query;
mod report;
mod transition;


use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::cache::{CacheStore, ConstraintCache, Shape};
use crate::model::{ModifierId, Snapshot, System};
use crate::solver::{Backend, LinearBackend};

use query::{Query, Task};

pub use aggregate::{earliest, earliest_time};
pub use config::{CalculatorConfig, Isolation};
pub use error::CalcError;
pub use report::{Candidate, Exactness, Outcome, Report};

/// Owns the constraint caches of the systems it has seen and the solver
/// backend every query runs against.
pub struct NextChangeCalculator {
    config: CalculatorConfig,
    store: CacheStore,
    backend: Arc<dyn Backend>,
}

impl Default for NextChangeCalculator {
    fn default() -> Self {
        Self::new(CalculatorConfig::default())
    }
}

impl fmt::Debug for NextChangeCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextChangeCalculator")
            .field("config", &self.config)
            .field("caches", &self.store.len())
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl NextChangeCalculator {
    /// Calculator on the built-in linear backend, sized from `config`.
    pub fn new(config: CalculatorConfig) -> Self {
        let backend = Arc::new(LinearBackend::new(config.max_disjuncts, config.max_rows));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: CalculatorConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            store: CacheStore::new(),
            backend,
        }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Drops the cached constraints of `system`. Returns whether any existed.
    pub fn invalidate(&self, system: &System) -> bool {
        self.store.invalidate(system.id())
    }

    fn query(&self, system: &System) -> Result<Query, CalcError> {
        let cache = self.store.get_or_build(system)?;
        Ok(Query {
            cache,
            snapshot: Arc::new(system.snapshot()),
            backend: Arc::clone(&self.backend),
            domain: self.config.time_domain,
            isolation: self.config.isolation,
            worker_deadline: self.config.worker_deadline,
            max_workers: self.config.max_workers,
        })
    }

    /// Solves every qualifying modifier of `system`.
    ///
    /// # Errors
    ///
    /// Only a cache build failure aborts the query. Per-modifier errors are
    /// collected in [`Report::failures`].
    #[instrument(skip_all, fields(system = %system.id(), revision = system.revision()))]
    pub fn evaluate(&self, system: &System) -> Result<Report, CalcError> {
        let query = Arc::new(self.query(system)?);
        let tasks = qualifying(&query.cache, &query.snapshot);
        if tasks.is_empty() {
            debug!("no modifier can change behaviour by time alone");
            return Ok(Report::default());
        }
        debug!(tasks = tasks.len(), isolation = ?query.isolation, "solving");

        let report = parallel::run(query, &tasks);
        info!(
            candidates = report.candidates.len(),
            never = report.never.len(),
            undecidable = report.undecidable.len(),
            timed_out = report.timed_out.len(),
            failures = report.failures.len(),
            earliest = %report.earliest().map(|c| c.time.to_string()).unwrap_or_default(),
            "evaluated"
        );
        Ok(report)
    }

    /// Every candidate, sorted earliest first and not reduced.
    pub fn candidates(&self, system: &System) -> Result<Vec<Candidate>, CalcError> {
        Ok(self.evaluate(system)?.candidates)
    }

    /// The earliest upcoming behaviour change, or `None` when time alone
    /// changes nothing.
    pub fn next_behaviour_change(&self, system: &System) -> Result<Option<Candidate>, CalcError> {
        Ok(earliest(self.candidates(system)?))
    }

    /// Earliest branch flip of one branching influence or update, solved on
    /// the calling thread.
    pub fn condition_change(
        &self,
        system: &System,
        modifier: ModifierId,
    ) -> Result<Outcome, CalcError> {
        enabler::condition_change(&self.query(system)?, modifier)
    }

    /// Earliest enabling time of one transition, solved on the calling thread.
    pub fn transition_time(
        &self,
        system: &System,
        modifier: ModifierId,
    ) -> Result<Outcome, CalcError> {
        transition::transition_time(&self.query(system)?, modifier)
    }
}

fn qualifying(cache: &ConstraintCache, snapshot: &Snapshot) -> Vec<Task> {
    cache
        .modifiers()
        .filter_map(|(id, cached)| {
            let branching = cached.conditions.is_some();
            match cached.shape {
                Shape::Influence { .. } if branching => Some(Task::ConditionChange(id)),
                Shape::Update { state, .. } if branching && snapshot.is_active(state) => {
                    Some(Task::ConditionChange(id))
                }
                Shape::Transition { source, .. } if snapshot.is_active(source) => {
                    Some(Task::Transition(id))
                }
                _ => None,
            }
        })
        .collect()
}

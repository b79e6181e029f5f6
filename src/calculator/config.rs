//! Configuration for the next-behaviour-change calculator.

use std::time::Duration;

use crate::time::TimeDomain;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How per-modifier calculations are scoped and scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Isolation {
    /// Every calculation runs on the calling thread against the cache's own
    /// scope.
    Shared,
    /// Every calculation forks its own scope, rebinds the cached constraints
    /// into it and runs on its own worker thread.
    #[default]
    PerTask,
}

/// Calculator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalculatorConfig {
    // --- Time ---
    /// Numeric domain of `dt`, fixed for the whole calculator.
    pub time_domain: TimeDomain,

    // --- Concurrency ---
    pub isolation: Isolation,
    /// Budget of a single modifier calculation. Workers still running once it
    /// has elapsed are reported as timed out.
    pub worker_deadline: Option<Duration>,
    /// Upper bound on solver threads per query; `None` uses the available
    /// parallelism.
    pub max_workers: Option<usize>,

    // --- Built-in backend limits ---
    /// Largest DNF the linear backend expands before answering unknown.
    pub max_disjuncts: usize,
    /// Largest row set Fourier–Motzkin elimination may produce.
    pub max_rows: usize,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            time_domain: TimeDomain::Rational,
            isolation: Isolation::PerTask,
            worker_deadline: Some(Duration::from_secs(5)),
            max_workers: None,
            max_disjuncts: 256,
            max_rows: 4096,
        }
    }
}

impl CalculatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_domain(mut self, domain: TimeDomain) -> Self {
        self.time_domain = domain;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_worker_deadline(mut self, deadline: Duration) -> Self {
        self.worker_deadline = Some(deadline);
        self
    }

    pub fn without_deadline(mut self) -> Self {
        self.worker_deadline = None;
        self
    }

    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = Some(max.max(1));
        self
    }

    pub fn with_max_disjuncts(mut self, max: usize) -> Self {
        self.max_disjuncts = max;
        self
    }

    pub fn with_max_rows(mut self, max: usize) -> Self {
        self.max_rows = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = CalculatorConfig::default();
        assert_eq!(cfg.time_domain, TimeDomain::Rational);
        assert_eq!(cfg.isolation, Isolation::PerTask);
        assert!(cfg.worker_deadline.is_some());
        assert!(cfg.max_disjuncts > 0);
        assert!(cfg.max_rows > 0);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = CalculatorConfig::new()
            .with_time_domain(TimeDomain::Integer)
            .with_isolation(Isolation::Shared)
            .without_deadline()
            .with_max_workers(0)
            .with_max_rows(10);
        assert_eq!(cfg.time_domain, TimeDomain::Integer);
        assert_eq!(cfg.isolation, Isolation::Shared);
        assert_eq!(cfg.worker_deadline, None);
        assert_eq!(cfg.max_workers, Some(1));
        assert_eq!(cfg.max_rows, 10);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_serde_roundtrip() {
        let cfg = CalculatorConfig::default().with_isolation(Isolation::Shared);
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"shared\""));
        let back: CalculatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}

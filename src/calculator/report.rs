//! Per-modifier outcomes of a query and the report collecting them.

use tracing::{debug, error, warn};

use super::error::CalcError;
use crate::model::ModifierId;
use crate::time::Epsilon;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a candidate time was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Exactness {
    /// The optimizer's infimum.
    Optimal,
    /// The optimizer gave up and a satisfiability witness was taken instead.
    /// The true minimum may be earlier.
    WitnessOnly,
}

/// A possible next behaviour change.
///
/// Ordered by time first; modifier and label only break ties, so reducing a
/// set of candidates by `min` does not depend on their order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Candidate {
    pub time: Epsilon,
    pub modifier: ModifierId,
    /// Source text of the branch condition that flips; `None` for transitions.
    pub label: Option<String>,
    pub exactness: Exactness,
}

/// Result of one modifier calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Candidate(Candidate),
    /// Time alone never enables the transition or flips the branch.
    Never,
    /// The backend could decide neither the optimum nor satisfiability.
    Undecidable(String),
}

/// Everything a query found, per modifier.
#[derive(Debug, Default)]
pub struct Report {
    pub candidates: Vec<Candidate>,
    pub never: Vec<ModifierId>,
    pub undecidable: Vec<(ModifierId, String)>,
    /// Workers that did not report within the deadline.
    pub timed_out: Vec<ModifierId>,
    pub failures: Vec<(ModifierId, CalcError)>,
}

impl Report {
    pub(crate) fn record(&mut self, modifier: ModifierId, result: Result<Outcome, CalcError>) {
        match result {
            Ok(Outcome::Candidate(candidate)) => {
                debug!(
                    %modifier,
                    dt = %candidate.time,
                    label = candidate.label.as_deref().unwrap_or(""),
                    exactness = ?candidate.exactness,
                    "candidate"
                );
                self.candidates.push(candidate);
            }
            Ok(Outcome::Never) => {
                debug!(%modifier, "never enabled by time alone");
                self.never.push(modifier);
            }
            Ok(Outcome::Undecidable(reason)) => {
                warn!(%modifier, %reason, "undecidable, excluded from aggregate");
                self.undecidable.push((modifier, reason));
            }
            Err(e) => {
                error!(%modifier, error = %e, "modifier calculation failed");
                self.failures.push((modifier, e));
            }
        }
    }

    /// Sorts every list so the report does not depend on completion order.
    pub(crate) fn finish(&mut self) {
        self.candidates.sort();
        self.never.sort();
        self.undecidable.sort();
        self.timed_out.sort();
        self.failures.sort_by_key(|(id, _)| *id);
    }

    /// The earliest candidate.
    pub fn earliest(&self) -> Option<&Candidate> {
        self.candidates.iter().min()
    }

    /// Number of modifiers the query looked at.
    pub fn examined(&self) -> usize {
        self.candidates
            .iter()
            .map(|c| c.modifier)
            .chain(self.never.iter().copied())
            .chain(self.undecidable.iter().map(|(id, _)| *id))
            .chain(self.timed_out.iter().copied())
            .chain(self.failures.iter().map(|(id, _)| *id))
            .collect::<std::collections::BTreeSet<_>>()
            .len()
    }
}

use thiserror::Error;

use crate::cache::CacheError;
use crate::model::ModifierId;
use crate::modifier_map::MapError;
use crate::symbolic::ScopeError;

/// Errors of a next-behaviour-change query.
///
/// `Cache` aborts the whole query. Every other variant is raised for a
/// single modifier and collected in the report's failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalcError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("Modifier {0} is not in the constraint cache")]
    UnknownModifier(ModifierId),

    #[error("Modifier {0} has no branch condition")]
    NotBranching(ModifierId),

    #[error("Modifier {0} is not a transition")]
    NotTransition(ModifierId),

    #[error("Cannot spawn solver worker: {0}")]
    Spawn(String),

    #[error("Solver worker for modifier {0} stopped without a result")]
    WorkerLost(ModifierId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_map_errors_transparently() {
        let e: CalcError = MapError::Cycle {
            modifier: ModifierId(1),
        }
        .into();
        assert_eq!(
            e.to_string(),
            "Same-instant dependency cycle through modifier m1"
        );
    }

    #[test]
    fn spawn_display() {
        assert_eq!(
            CalcError::Spawn("out of threads".into()).to_string(),
            "Cannot spawn solver worker: out of threads"
        );
    }
}

use thiserror::Error;

use crate::symbolic::TranslateError;

/// Errors raised while building a constraint cache. No partial cache is kept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cannot translate modifier '{modifier}': {source}")]
    Translate {
        modifier: String,
        #[source]
        source: TranslateError,
    },

    #[error("Constraint cache store lock poisoned")]
    Poisoned,
}

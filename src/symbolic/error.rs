use thiserror::Error;

use super::{ScopeId, Var};

/// Raised when a variable is used outside the scope it belongs to.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Variable {var} of {} used against {expected}", var.scope())]
    ForeignVariable { var: Var, expected: ScopeId },
}

/// Errors raised while translating a body into a formula.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Unknown name '{0}'")]
    UnknownName(String),

    #[error("Expected a {expected} value in '{context}'")]
    TypeMismatch {
        expected: &'static str,
        context: String,
    },

    #[error("Division by a non-constant expression in '{0}'")]
    NonConstantDivisor(String),

    #[error("Division by zero in '{0}'")]
    DivisionByZero(String),

    #[error("Body has a path that never returns")]
    MissingReturn,

    #[error("Arithmetic overflow while translating '{0}'")]
    Overflow(String),
}

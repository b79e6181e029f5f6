//! The solver seam.
//!
//! A [`Backend`] minimizes or checks a [`Problem`]: assertions bound to a
//! single solving scope plus the distinguished time variable. External
//! solvers plug in by implementing the trait; [`LinearBackend`] is the exact
//! built-in procedure for linear rational arithmetic.

mod linear;
mod problem;

pub use linear::LinearBackend;
pub use problem::{Backend, Optimum, Problem, Satisfiability};

//! Exact time arithmetic: rationals, epsilon values and the `dt` domain.

mod epsilon;
mod rational;

pub use epsilon::Epsilon;
pub use rational::Rational;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Numeric domain of the distinguished time variable `dt`.
///
/// Fixed for a whole calculator. Port values are always rational; only the
/// minimized `dt` is restricted when `Integer` is selected, in which case the
/// infimum is rounded up to the smallest feasible integer and never carries an
/// epsilon part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeDomain {
    #[default]
    Rational,
    Integer,
}

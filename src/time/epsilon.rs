//! Epsilon-aware time values.
//!
//! A strict boundary such as `dt > 5` has no minimum, only an infimum. The
//! solver reports it as `5 + 1·ε`: the numeric part approached from above by
//! an infinitesimal. Ordering is lexicographic on `(numeric, eps)`, so the
//! exact `5` sorts strictly before `5 + ε`.

use std::fmt;

use qtty::{Quantity, Unit};

use super::Rational;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A time value `numeric + eps·ε`.
///
/// The derived ordering compares `numeric` first and `eps` second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Epsilon {
    numeric: Rational,
    eps: Rational,
}

impl Epsilon {
    pub const fn new(numeric: Rational, eps: Rational) -> Self {
        Self { numeric, eps }
    }

    /// An exact (attained) time.
    pub const fn exact(numeric: Rational) -> Self {
        Self::new(numeric, Rational::ZERO)
    }

    /// The infimum of `dt > numeric`.
    pub const fn just_after(numeric: Rational) -> Self {
        Self::new(numeric, Rational::ONE)
    }

    pub const fn numeric(&self) -> Rational {
        self.numeric
    }

    pub const fn eps_coefficient(&self) -> Rational {
        self.eps
    }

    pub const fn is_exact(&self) -> bool {
        self.eps.is_zero()
    }

    /// Native value of the numeric part; the infinitesimal is dropped.
    pub fn to_f64(&self) -> f64 {
        self.numeric.to_f64()
    }

    /// Converts the numeric part into a quantity of the caller's time unit.
    ///
    /// Solved times are unit-less; `U` states the unit the model's `dt` is
    /// expressed in.
    pub fn to_quantity<U: Unit>(&self) -> Quantity<U> {
        Quantity::<U>::new(self.to_f64())
    }
}

impl From<Rational> for Epsilon {
    fn from(value: Rational) -> Self {
        Self::exact(value)
    }
}

impl fmt::Display for Epsilon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.eps.is_zero() {
            write!(f, "{}", self.numeric)
        } else if self.eps == Rational::ONE {
            write!(f, "{}+ε", self.numeric)
        } else if self.eps.is_negative() {
            write!(f, "{}-{}ε", self.numeric, self.eps.abs())
        } else {
            write!(f, "{}+{}ε", self.numeric, self.eps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtty::Second;

    #[test]
    fn exact_sorts_before_epsilon_of_same_numeric() {
        let five = Epsilon::exact(Rational::from(5));
        let five_eps = Epsilon::just_after(Rational::from(5));
        let six = Epsilon::exact(Rational::from(6));
        assert!(five < five_eps);
        assert!(five_eps < six);
        assert_ne!(five, five_eps);
    }

    #[test]
    fn numeric_part_dominates_ordering() {
        let a = Epsilon::new(Rational::from(4), Rational::from(100));
        let b = Epsilon::exact(Rational::new(9, 2));
        assert!(a < b);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Epsilon::exact(Rational::from(5)).to_string(), "5");
        assert_eq!(Epsilon::just_after(Rational::from(5)).to_string(), "5+ε");
        assert_eq!(
            Epsilon::new(Rational::new(1, 2), Rational::from(2)).to_string(),
            "1/2+2ε"
        );
    }

    #[test]
    fn quantity_conversion_uses_numeric_part() {
        let t = Epsilon::just_after(Rational::new(5, 2));
        let q: Quantity<Second> = t.to_quantity();
        assert!((q.value() - 2.5).abs() < 1e-12);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_roundtrip() {
        let t = Epsilon::just_after(Rational::new(3, 4));
        let json = serde_json::to_string(&t).unwrap();
        let back: Epsilon = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}

//! Exact rational numbers for port values and solved times.
//!
//! Values are normalized to lowest terms on construction and the denominator
//! is always positive, so structural equality is numeric equality.
//!
//! # Examples
//!
//! ```rust
//! use hybridtime::time::Rational;
//!
//! let half = Rational::new(1, 2);
//! let third = Rational::new(1, 3);
//!
//! assert_eq!(half + third, Rational::new(5, 6));
//! assert_eq!(Rational::new(2, 4), half);
//! assert!(third < half);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rational number `num / den` backed by `i128`.
///
/// # Invariants
///
/// - `den > 0`
/// - `gcd(|num|, den) == 1`
///
/// The operator impls panic on `i128` overflow in the same way the primitive
/// integer operators do; the solver uses the `checked_*` family instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rational {
    num: i128,
    den: i128,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    /// Creates a normalized rational.
    ///
    /// # Panics
    ///
    /// Panics if `den == 0`.
    pub fn new(num: i128, den: i128) -> Self {
        Self::try_new(num, den).expect("rational denominator must be non-zero")
    }

    /// Creates a normalized rational, or `None` if `den == 0` or the sign
    /// normalization overflows.
    pub fn try_new(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if num == 0 {
            return Some(Self::ZERO);
        }
        let g = gcd(num, den);
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = num.checked_neg()?;
            den = den.checked_neg()?;
        }
        Some(Self { num, den })
    }

    pub const fn from_integer(value: i128) -> Self {
        Self { num: value, den: 1 }
    }

    pub const fn numer(&self) -> i128 {
        self.num
    }

    pub const fn denom(&self) -> i128 {
        self.den
    }

    pub const fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.num > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.num < 0
    }

    pub const fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn abs(&self) -> Self {
        Self {
            num: self.num.abs(),
            den: self.den,
        }
    }

    /// Largest integer `<= self`.
    pub fn floor(&self) -> Self {
        Self::from_integer(self.num.div_euclid(self.den))
    }

    /// Smallest integer `>= self`.
    pub fn ceil(&self) -> Self {
        let floor = self.num.div_euclid(self.den);
        if self.num.rem_euclid(self.den) == 0 {
            Self::from_integer(floor)
        } else {
            Self::from_integer(floor + 1)
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        let g = gcd(self.den, rhs.den);
        let lhs_scale = rhs.den / g;
        let rhs_scale = self.den / g;
        let num = self
            .num
            .checked_mul(lhs_scale)?
            .checked_add(rhs.num.checked_mul(rhs_scale)?)?;
        let den = self.den.checked_mul(lhs_scale)?;
        Self::try_new(num, den)
    }

    pub fn checked_neg(&self) -> Option<Self> {
        Some(Self {
            num: self.num.checked_neg()?,
            den: self.den,
        })
    }

    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        self.checked_add(&rhs.checked_neg()?)
    }

    pub fn checked_mul(&self, rhs: &Self) -> Option<Self> {
        // Cross-reduce first to keep intermediates small.
        let g1 = gcd(self.num, rhs.den).max(1);
        let g2 = gcd(rhs.num, self.den).max(1);
        let num = (self.num / g1).checked_mul(rhs.num / g2)?;
        let den = (self.den / g2).checked_mul(rhs.den / g1)?;
        Self::try_new(num, den)
    }

    pub fn checked_div(&self, rhs: &Self) -> Option<Self> {
        if rhs.is_zero() {
            return None;
        }
        self.checked_mul(&Self::try_new(rhs.den, rhs.num)?)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::from_integer(i128::from(value))
    }
}

impl From<i32> for Rational {
    fn from(value: i32) -> Self {
        Self::from_integer(i128::from(value))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        match (
            self.num.checked_mul(other.den),
            other.num.checked_mul(self.den),
        ) {
            (Some(lhs), Some(rhs)) => lhs.cmp(&rhs),
            // Out of i128 range: fall back to floor comparison, then floats.
            _ => self
                .floor()
                .num
                .cmp(&other.floor().num)
                .then_with(|| self.to_f64().total_cmp(&other.to_f64())),
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Rational {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.checked_add(&rhs).expect("rational addition overflow")
    }
}

impl Sub for Rational {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.checked_sub(&rhs).expect("rational subtraction overflow")
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.checked_mul(&rhs).expect("rational multiplication overflow")
    }
}

impl Div for Rational {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        assert!(!rhs.is_zero(), "rational division by zero");
        self.checked_div(&rhs).expect("rational division overflow")
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self {
        self.checked_neg().expect("rational negation overflow")
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_sign_and_gcd() {
        let r = Rational::new(6, -9);
        assert_eq!(r.numer(), -2);
        assert_eq!(r.denom(), 3);
        assert_eq!(Rational::new(0, -5), Rational::ZERO);
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Rational::new(1, 3);
        let b = Rational::new(1, 6);
        assert_eq!(a + b, Rational::new(1, 2));
        assert_eq!(a - b, Rational::new(1, 6));
        assert_eq!(a * b, Rational::new(1, 18));
        assert_eq!(a / b, Rational::from(2));
        assert_eq!(-a, Rational::new(-1, 3));
    }

    #[test]
    fn floor_and_ceil_handle_negatives() {
        assert_eq!(Rational::new(7, 2).floor(), Rational::from(3));
        assert_eq!(Rational::new(7, 2).ceil(), Rational::from(4));
        assert_eq!(Rational::new(-7, 2).floor(), Rational::from(-4));
        assert_eq!(Rational::new(-7, 2).ceil(), Rational::from(-3));
        assert_eq!(Rational::from(5).ceil(), Rational::from(5));
    }

    #[test]
    fn ordering_matches_value() {
        let mut values = vec![
            Rational::new(1, 2),
            Rational::from(-1),
            Rational::new(1, 3),
            Rational::ZERO,
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Rational::from(-1),
                Rational::ZERO,
                Rational::new(1, 3),
                Rational::new(1, 2)
            ]
        );
    }

    #[test]
    fn checked_ops_report_overflow() {
        let big = Rational::from_integer(i128::MAX);
        assert!(big.checked_add(&Rational::ONE).is_none());
        assert!(big.checked_mul(&Rational::from(2)).is_none());
        assert!(Rational::ONE.checked_div(&Rational::ZERO).is_none());
    }

    #[test]
    fn display_format() {
        assert_eq!(Rational::from(5).to_string(), "5");
        assert_eq!(Rational::new(-3, 4).to_string(), "-3/4");
    }
}

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_integer::Integer;
use num_rational::Ratio;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Rational payload of every time and frequency value.
pub type Rational = Ratio<i64>;

/// Grid axis, used to label nature errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Time,
    Frequency,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Time => write!(f, "time"),
            Axis::Frequency => write!(f, "frequency"),
        }
    }
}

/// Whether a value is a displacement (shift) or an absolute position (point).
///
/// Shifts are closed under addition; a point plus a shift is a point;
/// two points never add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nature {
    Shift,
    Point,
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nature::Shift => write!(f, "shift"),
            Nature::Point => write!(f, "point"),
        }
    }
}

impl Nature {
    /// Nature of `self + rhs`.
    pub fn add(self, rhs: Nature, axis: Axis) -> Result<Nature> {
        match (self, rhs) {
            (Nature::Shift, Nature::Shift) => Ok(Nature::Shift),
            (Nature::Point, Nature::Shift) | (Nature::Shift, Nature::Point) => Ok(Nature::Point),
            (Nature::Point, Nature::Point) => Err(Error::MixedNature {
                axis,
                left: self,
                right: rhs,
            }),
        }
    }

    /// Nature of `self - rhs`.
    pub fn sub(self, rhs: Nature, axis: Axis) -> Result<Nature> {
        match (self, rhs) {
            (Nature::Shift, Nature::Shift) | (Nature::Point, Nature::Point) => Ok(Nature::Shift),
            (Nature::Point, Nature::Shift) => Ok(Nature::Point),
            (Nature::Shift, Nature::Point) => Err(Error::MixedNature {
                axis,
                left: self,
                right: rhs,
            }),
        }
    }

    /// Unify two optional natures. `None` is absorbed; concrete natures must match.
    pub fn unify(left: Option<Nature>, right: Option<Nature>, axis: Axis) -> Result<Option<Nature>> {
        match (left, right) {
            (Some(l), Some(r)) if l != r => Err(Error::MixedNature {
                axis,
                left: l,
                right: r,
            }),
            (Some(l), _) => Ok(Some(l)),
            (None, r) => Ok(r),
        }
    }

    /// Optional form of [`Nature::add`]; an unset side yields the other side.
    pub fn add_optional(
        left: Option<Nature>,
        right: Option<Nature>,
        axis: Axis,
    ) -> Result<Option<Nature>> {
        match (left, right) {
            (Some(l), Some(r)) => l.add(r, axis).map(Some),
            (l, None) => Ok(l),
            (None, r) => Ok(r),
        }
    }

    /// Optional form of [`Nature::sub`]; an unset side yields the other side.
    pub fn sub_optional(
        left: Option<Nature>,
        right: Option<Nature>,
        axis: Axis,
    ) -> Result<Option<Nature>> {
        match (left, right) {
            (Some(l), Some(r)) => l.sub(r, axis).map(Some),
            (l, None) => Ok(l),
            (None, r) => Ok(r),
        }
    }
}

macro_rules! tagged_pair {
    ($(#[$shift_doc:meta])* $shift:ident, $(#[$point_doc:meta])* $point:ident) => {
        $(#[$shift_doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $shift(pub Rational);

        $(#[$point_doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $point(pub Rational);

        impl $shift {
            /// Panics if `denom` is zero.
            pub fn new(numer: i64, denom: i64) -> Self {
                Self(Rational::new(numer, denom))
            }

            pub fn from_integer(value: i64) -> Self {
                Self(Rational::from_integer(value))
            }

            pub fn zero() -> Self {
                Self(Rational::zero())
            }

            pub fn value(self) -> Rational {
                self.0
            }
        }

        impl $point {
            /// Panics if `denom` is zero.
            pub fn new(numer: i64, denom: i64) -> Self {
                Self(Rational::new(numer, denom))
            }

            pub fn from_integer(value: i64) -> Self {
                Self(Rational::from_integer(value))
            }

            pub fn value(self) -> Rational {
                self.0
            }
        }

        impl From<Rational> for $shift {
            fn from(value: Rational) -> Self {
                Self(value)
            }
        }

        impl From<Rational> for $point {
            fn from(value: Rational) -> Self {
                Self(value)
            }
        }

        impl Add for $shift {
            type Output = $shift;
            fn add(self, rhs: $shift) -> $shift {
                $shift(self.0 + rhs.0)
            }
        }

        impl Sub for $shift {
            type Output = $shift;
            fn sub(self, rhs: $shift) -> $shift {
                $shift(self.0 - rhs.0)
            }
        }

        impl Neg for $shift {
            type Output = $shift;
            fn neg(self) -> $shift {
                $shift(-self.0)
            }
        }

        impl Mul<i64> for $shift {
            type Output = $shift;
            fn mul(self, rhs: i64) -> $shift {
                $shift(self.0 * rhs)
            }
        }

        impl Add<$shift> for $point {
            type Output = $point;
            fn add(self, rhs: $shift) -> $point {
                $point(self.0 + rhs.0)
            }
        }

        impl Add<$point> for $shift {
            type Output = $point;
            fn add(self, rhs: $point) -> $point {
                $point(self.0 + rhs.0)
            }
        }

        impl Sub<$shift> for $point {
            type Output = $point;
            fn sub(self, rhs: $shift) -> $point {
                $point(self.0 - rhs.0)
            }
        }

        impl Sub for $point {
            type Output = $shift;
            fn sub(self, rhs: $point) -> $shift {
                $shift(self.0 - rhs.0)
            }
        }

        impl fmt::Display for $shift {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Display for $point {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

tagged_pair!(
    /// A duration.
    TimeShift,
    /// An absolute position in time.
    TimePoint
);

tagged_pair!(
    /// An interval between pitches.
    FrequencyShift,
    /// An absolute pitch.
    FrequencyPoint
);

/// Greatest common divisor generalized to rationals: the coarsest quantum of
/// which both `a` and `b` are integer multiples.
///
/// Both values are rescaled to the common denominator `lcm(den_a, den_b)`;
/// the result is `gcd(num_a', num_b') / lcm(den_a, den_b)`.
pub fn rational_gcd(a: Rational, b: Rational) -> Rational {
    let denom = a.denom().lcm(b.denom());
    let numer_a = a.numer() * (denom / a.denom());
    let numer_b = b.numer() * (denom / b.denom());
    Rational::new(numer_a.gcd(&numer_b), denom)
}

/// [`rational_gcd`] folded over a set of values. `None` for an empty set.
pub fn rational_gcd_all<I>(values: I) -> Option<Rational>
where
    I: IntoIterator<Item = Rational>,
{
    values.into_iter().reduce(rational_gcd)
}

/// Number of `quantum`s in `value`, failing when the ratio is not integral.
pub(crate) fn quanta(value: Rational, quantum: Rational) -> Result<i64> {
    let ratio = value / quantum;
    if ratio.is_integer() {
        Ok(ratio.to_integer())
    } else {
        Err(Error::NonIntegerRatio {
            from: value,
            to: quantum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_and_point_arithmetic() {
        let onset = TimePoint::new(1, 1);
        let half = TimeShift::new(1, 2);

        assert_eq!(onset + half, TimePoint::new(3, 2));
        assert_eq!(half + onset, TimePoint::new(3, 2));
        assert_eq!(half + half, TimeShift::from_integer(1));
        assert_eq!(TimePoint::new(3, 2) - onset, half);
        assert_eq!(onset - half, TimePoint::new(1, 2));
        assert_eq!(-half, TimeShift::new(-1, 2));
    }

    #[test]
    fn nature_tables_reject_point_sums() {
        assert_eq!(
            Nature::Point.add(Nature::Point, Axis::Time),
            Err(Error::MixedNature {
                axis: Axis::Time,
                left: Nature::Point,
                right: Nature::Point,
            })
        );
        assert!(Nature::Shift.sub(Nature::Point, Axis::Frequency).is_err());
        assert_eq!(Nature::Point.sub(Nature::Point, Axis::Time), Ok(Nature::Shift));
        assert_eq!(Nature::Shift.add(Nature::Point, Axis::Time), Ok(Nature::Point));
    }

    #[test]
    fn unset_nature_is_absorbed() {
        assert_eq!(
            Nature::unify(None, Some(Nature::Point), Axis::Time),
            Ok(Some(Nature::Point))
        );
        assert_eq!(Nature::unify(None, None, Axis::Time), Ok(None));
        assert!(Nature::unify(Some(Nature::Shift), Some(Nature::Point), Axis::Time).is_err());
        assert_eq!(
            Nature::add_optional(Some(Nature::Point), None, Axis::Frequency),
            Ok(Some(Nature::Point))
        );
    }

    #[test]
    fn gcd_of_rationals() {
        assert_eq!(
            rational_gcd(Rational::new(1, 2), Rational::new(1, 3)),
            Rational::new(1, 6)
        );
        assert_eq!(
            rational_gcd(Rational::new(3, 4), Rational::new(1, 2)),
            Rational::new(1, 4)
        );
        assert_eq!(
            rational_gcd(Rational::from_integer(0), Rational::new(1, 2)),
            Rational::new(1, 2)
        );
        assert_eq!(
            rational_gcd_all([Rational::new(2, 3), Rational::new(4, 9), Rational::from_integer(2)]),
            Some(Rational::new(2, 9))
        );
        assert_eq!(rational_gcd_all(Vec::new()), None);
    }

    #[test]
    fn quanta_requires_integral_ratio() {
        assert_eq!(quanta(Rational::new(3, 2), Rational::new(1, 4)), Ok(6));
        assert!(quanta(Rational::new(1, 3), Rational::new(1, 4)).is_err());
    }
}

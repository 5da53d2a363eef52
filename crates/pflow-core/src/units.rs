//! Unit newtypes for the quantities that cross the engine boundary.
//!
//! Inside the solver everything is per-unit on the system MVA base with angles
//! in radians. Input records and reports use MW, Mvar and degrees; these types
//! make the conversions explicit at those edges.
//!
//! ```
//! use pflow_core::units::{Degrees, Megawatts, MegavoltAmperes};
//!
//! let base = MegavoltAmperes(100.0);
//! assert_eq!(Megawatts(125.0).to_per_unit(base).0, 1.25);
//! assert!((Degrees(180.0).to_radians().0 - std::f64::consts::PI).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match f.precision() {
                    Some(p) => write!(f, "{:.*} {}", p, self.0, $unit_name),
                    None => write!(f, "{} {}", self.0, $unit_name),
                }
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavolt-amperes reactive (Mvar)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megavars(pub f64);

impl_unit_ops!(Megavars, "Mvar");

/// Apparent power in megavolt-amperes (MVA); also used for the system base
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");

/// Per-unit quantity on the system base
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "deg");

impl Megawatts {
    #[inline]
    pub fn to_per_unit(self, base: MegavoltAmperes) -> PerUnit {
        PerUnit(self.0 / base.0)
    }
}

impl Megavars {
    #[inline]
    pub fn to_per_unit(self, base: MegavoltAmperes) -> PerUnit {
        PerUnit(self.0 / base.0)
    }
}

impl PerUnit {
    #[inline]
    pub fn to_megawatts(self, base: MegavoltAmperes) -> Megawatts {
        Megawatts(self.0 * base.0)
    }

    #[inline]
    pub fn to_megavars(self, base: MegavoltAmperes) -> Megavars {
        Megavars(self.0 * base.0)
    }
}

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_base_round_trip() {
        let base = MegavoltAmperes(100.0);
        let pu = Megavars(-35.0).to_per_unit(base);
        assert!((pu.0 + 0.35).abs() < 1e-12);
        assert!((pu.to_megavars(base).0 + 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_display_respects_precision() {
        assert_eq!(format!("{:.2}", Megawatts(71.6412)), "71.64 MW");
        assert_eq!(format!("{}", Degrees(-4.5)), "-4.5 deg");
    }

    #[test]
    fn test_sum() {
        let total: Megawatts = [Megawatts(125.0), Megawatts(90.0), Megawatts(100.0)]
            .into_iter()
            .sum();
        assert_eq!(total, Megawatts(315.0));
    }
}

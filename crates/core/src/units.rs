//! Volume units and rate-basis conversions.
//!
//! Liters are the storage unit, kiloliters the display unit. Cost bases are
//! per load, per liter and per kiloliter. Every conversion that divides by a
//! capacity returns `None` instead of failing when the capacity is not
//! positive.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Liters in one kiloliter. Meter faces read in kiloliters.
pub const LITERS_PER_KL: Decimal = Decimal::ONE_THOUSAND;

// ---------------------------------------------------------------------------
// Volume newtypes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Liters(pub Decimal);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kiloliters(pub Decimal);

impl Liters {
    pub const ZERO: Liters = Liters(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Liters(value)
    }

    pub fn from_whole(liters: i64) -> Self {
        Liters(Decimal::from(liters))
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn to_kl(self) -> Kiloliters {
        Kiloliters(self.0 / LITERS_PER_KL)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl Kiloliters {
    pub const ZERO: Kiloliters = Kiloliters(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Kiloliters(value)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    pub fn to_liters(self) -> Liters {
        Liters(self.0 * LITERS_PER_KL)
    }
}

impl From<Kiloliters> for Liters {
    fn from(kl: Kiloliters) -> Self {
        kl.to_liters()
    }
}

impl From<Liters> for Kiloliters {
    fn from(l: Liters) -> Self {
        l.to_kl()
    }
}

macro_rules! volume_ops {
    ($t:ident) => {
        impl Add for $t {
            type Output = $t;
            fn add(self, rhs: $t) -> $t {
                $t(self.0 + rhs.0)
            }
        }

        impl Sub for $t {
            type Output = $t;
            fn sub(self, rhs: $t) -> $t {
                $t(self.0 - rhs.0)
            }
        }

        impl AddAssign for $t {
            fn add_assign(&mut self, rhs: $t) {
                self.0 += rhs.0;
            }
        }

        impl Mul<Decimal> for $t {
            type Output = $t;
            fn mul(self, rhs: Decimal) -> $t {
                $t(self.0 * rhs)
            }
        }

        impl Sum for $t {
            fn sum<I: Iterator<Item = $t>>(iter: I) -> $t {
                iter.fold($t::ZERO, |acc, v| acc + v)
            }
        }

        impl<'a> Sum<&'a $t> for $t {
            fn sum<I: Iterator<Item = &'a $t>>(iter: I) -> $t {
                iter.fold($t::ZERO, |acc, v| acc + *v)
            }
        }
    };
}

volume_ops!(Liters);
volume_ops!(Kiloliters);

// ---------------------------------------------------------------------------
// Rate-basis conversions
// ---------------------------------------------------------------------------

pub fn cost_per_kl_from_liter(cost_per_liter: Decimal) -> Decimal {
    cost_per_liter * LITERS_PER_KL
}

pub fn cost_per_liter_from_kl(cost_per_kl: Decimal) -> Decimal {
    cost_per_kl / LITERS_PER_KL
}

/// `cost_per_load / capacity_liters`, or `None` for a non-positive capacity.
pub fn cost_per_liter_from_load(cost_per_load: Decimal, capacity: Liters) -> Option<Decimal> {
    if capacity.0 <= Decimal::ZERO {
        return None;
    }
    Some(cost_per_load / capacity.0)
}

/// `cost_per_load / (capacity_liters / 1000)`, or `None` for a non-positive capacity.
pub fn cost_per_kl_from_load(cost_per_load: Decimal, capacity: Liters) -> Option<Decimal> {
    if capacity.0 <= Decimal::ZERO {
        return None;
    }
    Some(cost_per_load / capacity.to_kl().0)
}

/// Whole meter units (kiloliters) to liters.
pub fn meter_units_to_liters(units: i64) -> i64 {
    units.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn kl_liters_conversion() {
        assert_eq!(Kiloliters(d("12")).to_liters(), Liters(d("12000")));
        assert_eq!(Liters(d("2500")).to_kl(), Kiloliters(d("2.5")));
        assert_eq!(Liters(d("1")).to_kl(), Kiloliters(d("0.001")));
    }

    #[test]
    fn per_load_conversions() {
        let cap = Liters(d("12000"));
        assert_eq!(cost_per_liter_from_load(d("1500"), cap), Some(d("0.125")));
        assert_eq!(cost_per_kl_from_load(d("1500"), cap), Some(d("125")));
    }

    #[test]
    fn zero_capacity_degrades_to_none() {
        assert_eq!(cost_per_liter_from_load(d("1500"), Liters::ZERO), None);
        assert_eq!(cost_per_kl_from_load(d("1500"), Liters(d("-1"))), None);
    }

    #[test]
    fn per_liter_to_per_kl() {
        assert_eq!(cost_per_kl_from_liter(d("0.05")), d("50"));
        assert_eq!(cost_per_liter_from_kl(d("50")), d("0.05"));
    }

    #[test]
    fn sums() {
        let total: Liters = [Liters(d("1.5")), Liters(d("2.5"))].iter().sum();
        assert_eq!(total, Liters(d("4")));
    }

    #[test]
    fn meter_units() {
        assert_eq!(meter_units_to_liters(5), 5000);
        assert_eq!(meter_units_to_liters(i64::MAX), i64::MAX);
    }
}

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A currency amount held as whole cents.
///
/// Documents on disk carry amounts as JSON numbers of currency units
/// (`1748.33`), the shape the platform's handlers already consume, so the
/// serde impls convert at the boundary and all arithmetic stays integral.
/// Arithmetic saturates at the representable bounds rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Whole currency units, no fractional part.
    pub fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn times(self, n: u64) -> Money {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        Money(self.0.saturating_mul(n))
    }

    /// Even division, truncating toward zero at cent granularity. Used for
    /// per-task rates; any sub-cent remainder stays in the budget pool.
    pub fn divide(self, n: u64) -> Money {
        if n == 0 {
            return Money::ZERO;
        }
        Money(self.0 / n as i64)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl serde::de::Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a currency amount as a JSON number")
            }

            fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Money, E> {
                Ok(Money((value * 100.0).round() as i64))
            }

            fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Money, E> {
                Ok(Money(value * 100))
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Money, E> {
                Ok(Money(value as i64 * 100))
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}

/// Which platform fee applies to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeSchedule {
    /// Freelance project invoicing: 5% of the invoice total.
    Freelance,
    /// Storefront product sales: 30% of the sale price.
    Storefront,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub platform_fee: Money,
    pub remainder: Money,
}

/// Splits `total` into a platform fee and a remainder such that
/// `platform_fee + remainder == total` exactly, at cent granularity.
/// The fee is rounded half-up to the nearest cent.
pub fn split_fee(total: Money, basis_points: u32) -> FeeSplit {
    let fee_cents = (total.cents() as i128 * basis_points as i128 + 5_000) / 10_000;
    let platform_fee = Money::from_cents(fee_cents as i64);
    FeeSplit {
        platform_fee,
        remainder: total - platform_fee,
    }
}

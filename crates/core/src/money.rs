//! Monetary amounts in the smallest currency unit.

use core::iter::Sum;
use core::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

pub const AMOUNT_OUT_OF_RANGE: &str = "Amount is out of range.";

/// Amount in the smallest currency unit (e.g. cents).
///
/// The currency lives next to the amount on the owning row; arithmetic here
/// never mixes currencies because carts and orders are single-currency.
///
/// The operators saturate at the `i64` bounds. Totals built from request
/// input go through the `checked_*` forms, which fail with a validation error.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

/// Fixed-point scale shared by percentages (basis points) and cent amounts.
pub const HUNDREDTHS: i64 = 100;

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Amount multiplied by a quantity, saturating.
    pub fn times(self, qty: i64) -> Self {
        Self(self.0.saturating_mul(qty))
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(out_of_range)
    }

    pub fn checked_sub(self, rhs: Money) -> DomainResult<Money> {
        self.0.checked_sub(rhs.0).map(Self).ok_or_else(out_of_range)
    }

    pub fn checked_mul(self, qty: i64) -> DomainResult<Money> {
        self.0.checked_mul(qty).map(Self).ok_or_else(out_of_range)
    }

    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// `basis_points / 10_000` of this amount, rounded half-to-even to the
    /// smallest unit.
    pub fn percent(self, basis_points: i64) -> Self {
        let num = i128::from(self.0) * i128::from(basis_points);
        let den = i128::from(HUNDREDTHS * HUNDREDTHS);
        let q = num.div_euclid(den);
        let r = num.rem_euclid(den);
        let rounded = match (2 * r).cmp(&den) {
            core::cmp::Ordering::Greater => q + 1,
            core::cmp::Ordering::Less => q,
            core::cmp::Ordering::Equal => q + (q & 1),
        };
        Self(rounded as i64)
    }
}

fn out_of_range() -> DomainError {
    DomainError::rule(AMOUNT_OUT_OF_RANGE)
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Money::from_minor(29999).to_string(), "299.99");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-150).to_string(), "-1.50");
    }

    #[test]
    fn percent_rounds_half_to_even() {
        // 10% of 1.25 = 0.125 -> 0.12
        assert_eq!(Money::from_minor(125).percent(1000), Money::from_minor(12));
        // 10% of 1.35 = 0.135 -> 0.14
        assert_eq!(Money::from_minor(135).percent(1000), Money::from_minor(14));
        // 12.5% of 10.00 = 1.25 exactly
        assert_eq!(Money::from_minor(1000).percent(1250), Money::from_minor(125));
    }

    #[test]
    fn sums_and_multiplies() {
        let lines = [Money::from_minor(100).times(2), Money::from_minor(250)];
        assert_eq!(lines.iter().sum::<Money>(), Money::from_minor(450));
    }

    #[test]
    fn checked_arithmetic_rejects_overflow() {
        let max = Money::from_minor(i64::MAX);
        assert_eq!(max.checked_add(Money::from_minor(1)).unwrap_err().to_string(), AMOUNT_OUT_OF_RANGE);
        assert!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)).is_err());
        assert!(Money::from_minor(2999).checked_mul(9_000_000_000_000_000_000).is_err());
        assert_eq!(Money::from_minor(250).checked_mul(4), Ok(Money::from_minor(1000)));
        assert!(Money::checked_sum([max, Money::from_minor(1)]).is_err());
        assert_eq!(
            Money::checked_sum([Money::from_minor(100), Money::from_minor(50)]),
            Ok(Money::from_minor(150))
        );
    }

    #[test]
    fn operators_saturate() {
        let max = Money::from_minor(i64::MAX);
        assert_eq!(max + Money::from_minor(1), max);
        assert_eq!(max.times(3), max);
        assert_eq!([max, max].iter().sum::<Money>(), max);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a percentage of at most 100% never exceeds the amount.
        #[test]
        fn percent_is_bounded(amount in 0i64..100_000_000i64, bp in 0i64..=10_000i64) {
            let discounted = Money::from_minor(amount).percent(bp);
            prop_assert!(discounted >= Money::ZERO);
            prop_assert!(discounted <= Money::from_minor(amount));
        }
    }
}

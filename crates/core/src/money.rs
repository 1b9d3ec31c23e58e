//! Currency and rate rounding.
//!
//! Persisted totals round half away from zero to 2 places. Rate caches keep 4.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const CURRENCY_DP: u32 = 2;
pub const RATE_CACHE_DP: u32 = 4;

/// Round a currency amount to 2 places, ties away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    round_dp(amount, CURRENCY_DP)
}

/// Round a derived rate (per liter / per kiloliter cache) to 4 places.
pub fn round_rate(rate: Decimal) -> Decimal {
    round_dp(rate, RATE_CACHE_DP)
}

pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounded report number. Reports serialize plain JSON numbers.
pub fn to_report(value: Decimal, dp: u32) -> f64 {
    round_dp(value, dp).to_f64().unwrap_or_default()
}

/// `numerator / denominator`, 0 when the denominator is zero.
pub fn ratio_or_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

//! Monetary rounding helpers.
//!
//! Every settlement figure is rounded to the currency minor unit with
//! banker's rounding, applied step by step in the order the breakdown is
//! computed, never re-derived from unrounded intermediates.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const DECIMAL_PLACES: u32 = 2;

/// Round to two decimal places, ties to even.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven)
}

/// Canonical two-decimal string, used for stored amounts and audit metadata.
pub fn display_2dp(value: Decimal) -> String {
    format!("{:.2}", round2(value))
}

/// Amount in minor units (cents) after rounding. `None` when the value does
/// not fit an `i64`, which no well-formed payment amount ever hits.
pub fn to_cents(value: Decimal) -> Option<i64> {
    (round2(value) * Decimal::ONE_HUNDRED).to_i64()
}

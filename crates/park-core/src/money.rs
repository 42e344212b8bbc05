//! Money helpers
//!
//! Every stored amount is an integer count of minor currency units (agorot).
//! Intermediate arithmetic runs on `Decimal` and is rounded back to minor
//! units exactly once per line item.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Integer minor-currency units
pub type MinorUnits = i64;

/// Minor units per major unit
pub const MINOR_PER_MAJOR: i64 = 100;

/// Round a decimal amount of minor units to an integer (half away from zero)
pub fn round_minor(amount: Decimal) -> MinorUnits {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Apply a rate to an amount of minor units, rounding once
pub fn apply_rate(amount: MinorUnits, rate: Decimal) -> MinorUnits {
    round_minor(Decimal::from(amount) * rate)
}

/// Major-unit display value derived from minor units
pub fn to_major(amount: MinorUnits) -> Decimal {
    Decimal::new(amount, 2)
}

/// Human readable amount, e.g. `₪14.00`
pub fn format_major(amount: MinorUnits) -> String {
    format!("₪{:.2}", to_major(amount))
}

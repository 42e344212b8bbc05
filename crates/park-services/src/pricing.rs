//! Pricing engine
//!
//! Converts a reservation duration and a tiered hourly price table into a
//! parking-cost-only charge. Two billing methods are supported:
//!
//! - `Legacy`: the duration is rounded up to whole hours, each hour billed at
//!   its tier price.
//! - `Proportional`: whole hours are billed at their tier, the trailing
//!   fractional hour at the same fraction of the next tier's price.
//!
//! Both methods bill at least one hour. Every line is rounded to minor units
//! on its own and the total is the sum of the rounded lines.

use park_core::{
    config::PricingMethod,
    models::{hour_price, ParkingResource, PriceTable, TimeWindow, OPERATIONAL_FEE_RATE},
    money::{round_minor, MinorUnits},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::constants::MS_PER_HOUR;

/// One billed hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceLine {
    /// 1-based hour number
    pub hour: u32,
    /// Tier price of that hour after the fallback chain
    pub tier_price: MinorUnits,
    /// Billed share of the hour, 1 for whole hours
    pub fraction: Decimal,
    /// Rounded line amount
    pub amount: MinorUnits,
}

/// Priced duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub total: MinorUnits,
    pub lines: Vec<PriceLine>,
    #[serde(skip)]
    pub method: PricingMethod,
    /// Hours billed, fractional under the proportional method
    pub billed_hours: Decimal,
}

/// Price of a fixed-length extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtensionQuote {
    pub minutes: i64,
    /// Parking-cost-only share
    pub parking_cost: MinorUnits,
    /// Operational fee on the parking cost
    pub fee: MinorUnits,
    /// Amount to collect from the requester
    pub total: MinorUnits,
}

/// Exact duration in hours
pub fn duration_hours(duration_ms: i64) -> Decimal {
    Decimal::from(duration_ms.max(0)) / Decimal::from(MS_PER_HOUR)
}

/// Whole hours billed by the legacy method, at least one
pub fn ceil_hours(duration_ms: i64) -> u32 {
    let hours = duration_ms.max(0).div_euclid(MS_PER_HOUR)
        + i64::from(duration_ms.max(0).rem_euclid(MS_PER_HOUR) > 0);
    u32::try_from(hours.max(1)).unwrap_or(u32::MAX)
}

fn whole_line(hour: u32, table: Option<&PriceTable>, flat_rate: MinorUnits) -> PriceLine {
    let tier_price = hour_price(table, hour as usize, flat_rate);
    PriceLine {
        hour,
        tier_price,
        fraction: Decimal::ONE,
        amount: tier_price,
    }
}

fn legacy(duration_ms: i64, table: Option<&PriceTable>, flat_rate: MinorUnits) -> Vec<PriceLine> {
    (1..=ceil_hours(duration_ms))
        .map(|hour| whole_line(hour, table, flat_rate))
        .collect()
}

fn proportional(
    duration_ms: i64,
    table: Option<&PriceTable>,
    flat_rate: MinorUnits,
) -> Vec<PriceLine> {
    let hours = duration_hours(duration_ms).max(Decimal::ONE);
    let whole = hours.trunc();
    let fraction = hours - whole;
    let whole_count = whole.to_u32().unwrap_or(1);

    let mut lines: Vec<PriceLine> = (1..=whole_count)
        .map(|hour| whole_line(hour, table, flat_rate))
        .collect();

    if !fraction.is_zero() {
        let hour = whole_count + 1;
        let tier_price = hour_price(table, hour as usize, flat_rate);
        lines.push(PriceLine {
            hour,
            tier_price,
            fraction,
            amount: round_minor(Decimal::from(tier_price) * fraction),
        });
    }
    lines
}

/// Price `duration_ms` with `method`
pub fn price(
    duration_ms: i64,
    table: Option<&PriceTable>,
    flat_rate: MinorUnits,
    method: PricingMethod,
) -> PriceBreakdown {
    let lines = match method {
        PricingMethod::Legacy => legacy(duration_ms, table, flat_rate),
        PricingMethod::Proportional => proportional(duration_ms, table, flat_rate),
    };
    let billed_hours = lines.iter().map(|l| l.fraction).sum();
    PriceBreakdown {
        total: lines.iter().map(|l| l.amount).sum(),
        lines,
        method,
        billed_hours,
    }
}

/// Quote an extension of `minutes` billed at the hour-1 tier.
///
/// The total is rounded once from the exact fee-inclusive amount; the fee is
/// whatever remains after the rounded parking share.
pub fn extension_quote(tier1_price: MinorUnits, minutes: i64) -> ExtensionQuote {
    let exact = Decimal::from(tier1_price) * Decimal::from(minutes) / Decimal::from(60);
    let parking_cost = round_minor(exact);
    let total = round_minor(exact * (Decimal::ONE + OPERATIONAL_FEE_RATE));
    ExtensionQuote {
        minutes,
        parking_cost,
        fee: total - parking_cost,
        total,
    }
}

/// Pricing engine bound to the configured billing method
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine {
    method: PricingMethod,
}

impl PricingEngine {
    pub fn new(method: PricingMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> PricingMethod {
        self.method
    }

    pub fn price(
        &self,
        duration_ms: i64,
        table: Option<&PriceTable>,
        flat_rate: MinorUnits,
    ) -> PriceBreakdown {
        price(duration_ms, table, flat_rate, self.method)
    }

    /// Parking cost of `window` on `resource`
    pub fn price_window(&self, resource: &ParkingResource, window: &TimeWindow) -> PriceBreakdown {
        let breakdown = self.price(
            window.duration_ms(),
            resource.price_table.as_ref(),
            resource.hourly_rate,
        );
        debug!(
            "Priced {} hours on {} at {} ({:?})",
            breakdown.billed_hours, resource.id, breakdown.total, self.method
        );
        breakdown
    }

    pub fn extension_quote(&self, resource: &ParkingResource, minutes: i64) -> ExtensionQuote {
        extension_quote(resource.price_for_hour(1), minutes)
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingMethod::default())
    }
}

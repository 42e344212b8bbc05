//! Commission and operational fee ledger records
//!
//! Both records are one-to-one with a reservation and keep the
//! parking-cost-only baseline separately from any fee or discount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::MinorUnits;

/// Marketplace commission rate on parking-cost-only
pub const COMMISSION_RATE: Decimal = dec!(0.15);

/// Searcher-side operational fee rate on parking-cost-only
pub const OPERATIONAL_FEE_RATE: Decimal = dec!(0.10);

/// Commission attributed to one hour tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionLine {
    /// 1-based hour number
    pub hour: u32,
    /// Tier price of that hour
    pub tier_price: MinorUnits,
    /// Commission on the tier price
    pub commission: MinorUnits,
}

/// Commission record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    /// Unique identifier
    pub id: Uuid,

    /// Owning reservation
    pub reservation_id: Uuid,

    /// Resource owner receiving the net amount
    pub owner_id: Uuid,

    /// Parking cost excluding the operational fee
    pub parking_cost: MinorUnits,

    /// Platform share
    pub commission_amount: MinorUnits,

    /// Owner share (`parking_cost - commission_amount`)
    pub net_owner_amount: MinorUnits,

    /// Rate applied
    pub rate: Decimal,

    /// Per-hour breakdown when a price table was used
    pub breakdown: Option<Vec<CommissionLine>>,

    /// Included in an owner payout
    pub payout_processed: bool,

    /// Payout that settled this commission
    pub payout_id: Option<Uuid>,

    /// When the amounts were last calculated
    pub calculated_at: DateTime<Utc>,
}

impl Commission {
    /// Ledger invariant: both shares add up to the parking cost
    pub fn is_balanced(&self) -> bool {
        self.commission_amount + self.net_owner_amount == self.parking_cost
    }
}

/// Operational fee record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalFee {
    /// Unique identifier
    pub id: Uuid,

    /// Owning reservation
    pub reservation_id: Uuid,

    /// Parking cost excluding the fee (never changed by coupons)
    pub parking_cost: MinorUnits,

    /// Fee charged on top of the parking cost
    pub fee_amount: MinorUnits,

    /// Amount actually charged to the requester
    pub total_charged: MinorUnits,

    /// Rate applied at creation
    pub rate: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl OperationalFee {
    /// `fee + parking_cost == total_charged`
    pub fn is_balanced(&self) -> bool {
        self.fee_amount + self.parking_cost == self.total_charged
    }
}

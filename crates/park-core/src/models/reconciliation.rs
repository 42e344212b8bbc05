//! Reconciliation items
//!
//! Records that need an operator's attention: ledger writes that failed after
//! the reservation itself succeeded, confirmed extension payments whose new
//! end could not be stored, cancellations of already paid-out commissions, and
//! schedules whose migration did not round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Kind of reconciliation item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    LedgerCreateFailed,
    LedgerUpdateFailed,
    LedgerReleaseFailed,
    PaidExtensionNotApplied,
    CancelledAfterPayout,
    ScheduleRoundTripMismatch,
}

impl fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationKind::LedgerCreateFailed => write!(f, "ledger_create_failed"),
            ReconciliationKind::LedgerUpdateFailed => write!(f, "ledger_update_failed"),
            ReconciliationKind::LedgerReleaseFailed => write!(f, "ledger_release_failed"),
            ReconciliationKind::PaidExtensionNotApplied => write!(f, "paid_extension_not_applied"),
            ReconciliationKind::CancelledAfterPayout => write!(f, "cancelled_after_payout"),
            ReconciliationKind::ScheduleRoundTripMismatch => {
                write!(f, "schedule_round_trip_mismatch")
            }
        }
    }
}

impl ReconciliationKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ledger_create_failed" => Some(ReconciliationKind::LedgerCreateFailed),
            "ledger_update_failed" => Some(ReconciliationKind::LedgerUpdateFailed),
            "ledger_release_failed" => Some(ReconciliationKind::LedgerReleaseFailed),
            "paid_extension_not_applied" => Some(ReconciliationKind::PaidExtensionNotApplied),
            "cancelled_after_payout" => Some(ReconciliationKind::CancelledAfterPayout),
            "schedule_round_trip_mismatch" => Some(ReconciliationKind::ScheduleRoundTripMismatch),
            _ => None,
        }
    }
}

/// Reconciliation item entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub id: Uuid,
    pub kind: ReconciliationKind,
    /// "reservation" or "resource"
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: Option<JsonValue>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationItem {
    pub fn for_reservation(kind: ReconciliationKind, reservation_id: Uuid, details: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            entity_type: "reservation".to_string(),
            entity_id: reservation_id,
            details: Some(details),
            resolved: false,
            created_at: Utc::now(),
        }
    }

    pub fn for_resource(kind: ReconciliationKind, resource_id: Uuid, details: JsonValue) -> Self {
        Self {
            entity_type: "resource".to_string(),
            ..Self::for_reservation(kind, resource_id, details)
        }
    }
}

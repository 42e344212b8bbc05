//! Reservation model
//!
//! A driver's timed claim on a parking resource, plus its status machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::money::MinorUnits;

/// Reservation status
///
/// ```text
/// PendingApproval --approve--> Confirmed --cancel--> Cancelled
///        |--reject--> Rejected
///        |--expiry sweep--> Expired
///        `--cancel--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Waiting for the owner to approve
    PendingApproval,
    /// Approved (or auto-confirmed) and holding the slot
    #[default]
    Confirmed,
    /// Refused by the owner
    Rejected,
    /// Owner did not answer before the approval deadline
    Expired,
    /// Cancelled by the requester or an operator
    Cancelled,
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::PendingApproval => write!(f, "pending_approval"),
            ReservationStatus::Confirmed => write!(f, "confirmed"),
            ReservationStatus::Rejected => write!(f, "rejected"),
            ReservationStatus::Expired => write!(f, "expired"),
            ReservationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ReservationStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending_approval" => Some(ReservationStatus::PendingApproval),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "rejected" => Some(ReservationStatus::Rejected),
            "expired" => Some(ReservationStatus::Expired),
            "cancelled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never block a resource's timeline
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected | ReservationStatus::Expired | ReservationStatus::Cancelled
        )
    }

    /// Statuses that occupy the timeline
    pub fn is_blocking(&self) -> bool {
        !self.is_terminal()
    }

    /// Non-terminal statuses, for storage queries
    pub fn blocking() -> [ReservationStatus; 2] {
        [ReservationStatus::PendingApproval, ReservationStatus::Confirmed]
    }

    /// Whether the state machine allows `self -> next`
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (PendingApproval, Confirmed)
                | (PendingApproval, Rejected)
                | (PendingApproval, Expired)
                | (PendingApproval, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

/// Where a reservation sits on the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelinePhase {
    Upcoming,
    Active,
    Ended,
}

/// Half-open `[start, end)` window in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    /// `end` strictly after `start`
    pub fn is_well_formed(&self) -> bool {
        self.end > self.start
    }

    /// Two windows overlap unless one ends before (or exactly when) the other starts
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}

/// Reservation entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier
    pub id: Uuid,

    /// Booked parking resource
    pub resource_id: Uuid,

    /// Driver who made the reservation
    pub requester_id: Uuid,

    /// Internal vehicle reference
    pub vehicle_id: Option<Uuid>,

    /// Free-text license plate
    pub license_plate: Option<String>,

    /// Start instant
    pub start_time: DateTime<Utc>,

    /// End instant (strictly after start)
    pub end_time: DateTime<Utc>,

    /// Current status
    pub status: ReservationStatus,

    /// Parking-cost-only price, excluding the operational fee
    pub total_price: MinorUnits,

    /// Approval deadline while pending
    pub approval_expires_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }

    /// Phase relative to `now`
    pub fn phase(&self, now: DateTime<Utc>) -> TimelinePhase {
        if now < self.start_time {
            TimelinePhase::Upcoming
        } else if now < self.end_time {
            TimelinePhase::Active
        } else {
            TimelinePhase::Ended
        }
    }

    /// Time left until the end, zero once ended
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).max(Duration::zero())
    }

    /// Apply a status transition, refusing moves the state machine forbids
    pub fn transition(&mut self, next: ReservationStatus) -> Result<(), crate::AppError> {
        if !self.status.can_transition_to(next) {
            return Err(crate::AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next != ReservationStatus::PendingApproval {
            self.approval_expires_at = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for Reservation {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            resource_id: Uuid::nil(),
            requester_id: Uuid::nil(),
            vehicle_id: None,
            license_plate: None,
            start_time: now,
            end_time: now + Duration::hours(1),
            status: ReservationStatus::Confirmed,
            total_price: 0,
            approval_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to create a reservation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub resource_id: Uuid,
    pub requester_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub vehicle_id: Option<Uuid>,
    #[validate(length(min = 2, max = 16))]
    pub license_plate: Option<String>,
}

impl CreateReservationRequest {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.end_time)
    }
}

/// Canonical plate form for comparisons: upper-case ASCII alphanumerics
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

//! Computed availability window (never persisted)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What ends an availability window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitedBy {
    /// The owner's weekly schedule closes
    Schedule,
    /// Another reservation starts
    Booking,
    /// Only the look-ahead cap applies
    None,
}

impl fmt::Display for LimitedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitedBy::Schedule => write!(f, "schedule"),
            LimitedBy::Booking => write!(f, "booking"),
            LimitedBy::None => write!(f, "none"),
        }
    }
}

/// How long a resource stays bookable from a given instant.
///
/// `available_until` is always a UTC instant, whichever cause produced it.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityWindow {
    pub from: DateTime<Utc>,
    pub available_until: DateTime<Utc>,
    pub limited_by: LimitedBy,
    pub can_book: bool,
    pub message: String,
    /// Why booking is impossible, when `can_book` is false
    pub reason: Option<String>,
}

impl AvailabilityWindow {
    /// Zero-width window for a resource that cannot be booked at all
    pub fn closed(from: DateTime<Utc>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            from,
            available_until: from,
            limited_by: LimitedBy::None,
            can_book: false,
            message: reason.clone(),
            reason: Some(reason),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.available_until - self.from).num_minutes()
    }
}

/// Outcome of checking a requested `[start, end)` window
#[derive(Debug, Clone, Serialize)]
pub struct WindowValidation {
    pub valid: bool,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    /// Latest acceptable end when the requested one is too late
    pub suggested_end: Option<DateTime<Utc>>,
    pub limited_by: Option<LimitedBy>,
}

impl WindowValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            error_code: None,
            suggested_end: None,
            limited_by: None,
        }
    }

    pub fn invalid(code: &'static str, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            error_code: Some(code),
            suggested_end: None,
            limited_by: None,
        }
    }
}

//! Owner payout model
//!
//! Aggregates one owner's unpaid commissions over a calendar month.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::money::MinorUnits;
use crate::AppError;

/// Payout status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    #[default]
    Pending,
    Processing,
    Paid,
    Failed,
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutStatus::Pending => write!(f, "pending"),
            PayoutStatus::Processing => write!(f, "processing"),
            PayoutStatus::Paid => write!(f, "paid"),
            PayoutStatus::Failed => write!(f, "failed"),
        }
    }
}

impl PayoutStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PayoutStatus::Pending),
            "processing" => Some(PayoutStatus::Processing),
            "paid" => Some(PayoutStatus::Paid),
            "failed" => Some(PayoutStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Paid) | (Processing, Failed) | (Failed, Pending)
        )
    }
}

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub year: i32,
    pub month: u32,
}

impl PayoutPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation(format!("invalid month {}", month)));
        }
        Ok(Self { year, month })
    }

    /// The calendar month before the one containing `now`
    pub fn previous_month(now: DateTime<Utc>) -> Self {
        if now.month() == 1 {
            Self {
                year: now.year() - 1,
                month: 12,
            }
        } else {
            Self {
                year: now.year(),
                month: now.month() - 1,
            }
        }
    }

    fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    fn first_instant(&self) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default();
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
    }

    /// Half-open `[start, end)` UTC bounds of the month
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.first_instant(), self.next().first_instant())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds();
        instant >= start && instant < end
    }
}

impl fmt::Display for PayoutPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Owner payout entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerPayout {
    /// Unique identifier
    pub id: Uuid,

    /// Owner being paid
    pub owner_id: Uuid,

    /// Month covered
    pub period: PayoutPeriod,

    /// Sum of parking costs of the included commissions
    pub gross_amount: MinorUnits,

    /// Sum of commission amounts retained by the platform
    pub commission_amount: MinorUnits,

    /// Sum of net owner amounts to transfer
    pub net_amount: MinorUnits,

    /// Number of commissions aggregated
    pub commission_count: i32,

    /// Current status
    pub status: PayoutStatus,

    /// External transfer reference, once known
    pub external_reference: Option<String>,

    /// Free-form note from the admin action
    pub notes: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl OwnerPayout {
    /// Move to `next`, refusing transitions the lifecycle forbids
    pub fn transition(&mut self, next: PayoutStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_month_wraps_year() {
        let jan = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(PayoutPeriod::previous_month(jan), PayoutPeriod { year: 2024, month: 12 });

        let jun = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(PayoutPeriod::previous_month(jun), PayoutPeriod { year: 2025, month: 5 });
    }

    #[test]
    fn test_bounds() {
        let dec = PayoutPeriod::new(2024, 12).unwrap();
        let (start, end) = dec.bounds();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert!(dec.contains(Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()));
        assert!(!dec.contains(end));
        assert!(PayoutPeriod::new(2024, 13).is_err());
        assert_eq!(dec.to_string(), "2024-12");
    }

    #[test]
    fn test_payout_transitions() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Processing));
        assert!(PayoutStatus::Processing.can_transition_to(PayoutStatus::Paid));
        assert!(PayoutStatus::Failed.can_transition_to(PayoutStatus::Pending));
        assert!(!PayoutStatus::Paid.can_transition_to(PayoutStatus::Pending));
        assert!(!PayoutStatus::Pending.can_transition_to(PayoutStatus::Paid));
    }
}

//! Parking resource model
//!
//! A parking space offered by an owner, with its weekly availability
//! schedule and its tiered hourly price table.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schedule::WeeklySchedule;
use crate::money::MinorUnits;

/// Tiered price table indexed by hour number (1-based).
///
/// An absent entry falls back to hour 1, and an absent hour 1 falls back to
/// the resource's flat hourly rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(pub Vec<Option<MinorUnits>>);

impl PriceTable {
    pub fn new(entries: Vec<Option<MinorUnits>>) -> Self {
        Self(entries)
    }

    /// Explicit entry for a 1-based hour, if any
    pub fn entry(&self, hour: usize) -> Option<MinorUnits> {
        if hour == 0 {
            return None;
        }
        self.0.get(hour - 1).copied().flatten()
    }

    /// Price of hour `hour` with the fallback chain hour -> hour 1 -> flat
    pub fn price_for_hour(&self, hour: usize, flat_rate: MinorUnits) -> MinorUnits {
        self.entry(hour).or_else(|| self.entry(1)).unwrap_or(flat_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Hourly price lookup over an optional table
pub fn hour_price(table: Option<&PriceTable>, hour: usize, flat_rate: MinorUnits) -> MinorUnits {
    match table {
        Some(t) => t.price_for_hour(hour, flat_rate),
        None => flat_rate,
    }
}

/// Parking resource entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingResource {
    /// Unique identifier
    pub id: Uuid,

    /// Owner (supply side user)
    pub owner_id: Uuid,

    /// Resource accepts bookings
    pub is_active: bool,

    /// Owner account has been blocked by the platform
    pub owner_blocked: bool,

    /// Tiered hourly prices
    pub price_table: Option<PriceTable>,

    /// Flat hourly rate used when no table entry applies
    pub hourly_rate: MinorUnits,

    /// Weekly availability; `None` means unrestricted
    pub schedule: Option<WeeklySchedule>,

    /// Local time zone of the resource; engine default when absent
    pub time_zone: Option<Tz>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ParkingResource {
    /// Price of a given hour number for this resource
    pub fn price_for_hour(&self, hour: usize) -> MinorUnits {
        hour_price(self.price_table.as_ref(), hour, self.hourly_rate)
    }

    /// No schedule, or a schedule with no available block at all
    pub fn is_unrestricted(&self) -> bool {
        self.schedule
            .as_ref()
            .map_or(true, WeeklySchedule::is_unrestricted)
    }

    /// Reason this resource cannot be booked, if any
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        if !self.is_active {
            Some("parking resource is not active")
        } else if self.owner_blocked {
            Some("parking owner is blocked")
        } else {
            None
        }
    }
}

impl Default for ParkingResource {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            is_active: true,
            owner_blocked: false,
            price_table: None,
            hourly_rate: 0,
            schedule: None,
            time_zone: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::Granularity;

    #[test]
    fn test_price_fallback_chain() {
        let table = PriceTable::new(vec![Some(1000), Some(800), None]);
        assert_eq!(table.price_for_hour(1, 500), 1000);
        assert_eq!(table.price_for_hour(2, 500), 800);
        // Missing entry falls back to hour 1
        assert_eq!(table.price_for_hour(3, 500), 1000);
        assert_eq!(table.price_for_hour(9, 500), 1000);

        let headless = PriceTable::new(vec![None, Some(800)]);
        assert_eq!(headless.price_for_hour(1, 500), 500);
        assert_eq!(headless.price_for_hour(2, 500), 800);
        assert_eq!(headless.price_for_hour(3, 500), 500);

        assert_eq!(hour_price(None, 4, 700), 700);
    }

    #[test]
    fn test_price_table_wire_format() {
        let table: PriceTable = serde_json::from_str("[1000, null, 600]").unwrap();
        assert_eq!(table.entry(2), None);
        assert_eq!(table.entry(3), Some(600));
        assert_eq!(serde_json::to_string(&table).unwrap(), "[1000,null,600]");
    }

    #[test]
    fn test_unrestricted() {
        let mut resource = ParkingResource::default();
        assert!(resource.is_unrestricted());

        resource.schedule = Some(WeeklySchedule::empty(Granularity::ThreeHour));
        assert!(resource.is_unrestricted());

        resource.schedule = Some(WeeklySchedule::full(Granularity::ThreeHour));
        assert!(!resource.is_unrestricted());
    }

    #[test]
    fn test_unavailable_reason() {
        let mut resource = ParkingResource::default();
        assert!(resource.unavailable_reason().is_none());
        resource.owner_blocked = true;
        assert_eq!(resource.unavailable_reason(), Some("parking owner is blocked"));
        resource.is_active = false;
        assert_eq!(resource.unavailable_reason(), Some("parking resource is not active"));
    }
}

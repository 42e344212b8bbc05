//! Availability calculator
//!
//! Determines how long a parking resource stays bookable from a given
//! instant. The owner's weekly schedule is evaluated in the resource's local
//! time, hour by hour, for up to seven days; the earliest competing
//! reservation can cut the window shorter. Every limit is returned as a UTC
//! instant tagged with its cause.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use park_core::{
    config::EngineConfig,
    models::{AvailabilityWindow, DayKey, LimitedBy, ParkingResource, Reservation, TimeWindow, WeeklySchedule},
    traits::{ReservationRepository, ResourceRepository},
    AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::constants::SCAN_DAYS;

/// Where the owner's schedule alone ends a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleBound {
    pub until: DateTime<Utc>,
    pub limited_by: LimitedBy,
}

impl ScheduleBound {
    fn closed(from: DateTime<Utc>) -> Self {
        Self {
            until: from,
            limited_by: LimitedBy::Schedule,
        }
    }
}

/// Scan the weekly schedule forward from `from`.
///
/// - No schedule, or no available block on any day: `from + lookahead`, unlimited.
/// - The day of `from` has no blocks, or the block holding `from` is
///   unavailable: the bound is `from` itself.
/// - Otherwise the first later local hour whose block is unavailable.
/// - Nothing closes within seven days: `from + 7d`, unlimited.
pub fn scan_schedule(
    schedule: Option<&WeeklySchedule>,
    tz: Tz,
    from: DateTime<Utc>,
    lookahead: Duration,
) -> ScheduleBound {
    let Some(schedule) = schedule.filter(|s| !s.is_unrestricted()) else {
        return ScheduleBound {
            until: from + lookahead,
            limited_by: LimitedBy::None,
        };
    };

    let local = from.with_timezone(&tz);
    let day0 = DayKey::from(local.weekday());
    if schedule.blocks_for(day0).is_none() || !schedule.is_hour_available(day0, local.hour() as u8)
    {
        return ScheduleBound::closed(from);
    }

    let horizon = from + Duration::days(SCAN_DAYS);
    let mut date = local.date_naive();
    let mut first_hour = local.hour() + 1;
    'scan: for _ in 0..=SCAN_DAYS {
        let day = DayKey::from(date.weekday());
        for hour in first_hour..24 {
            if schedule.is_hour_available(day, hour as u8) {
                continue;
            }
            // Local hours skipped by a DST jump have no instant
            let Some(boundary) = date
                .and_hms_opt(hour, 0, 0)
                .and_then(|naive| tz.from_local_datetime(&naive).earliest())
                .map(|b| b.with_timezone(&Utc))
                .filter(|b| *b > from)
            else {
                continue;
            };
            if boundary >= horizon {
                break 'scan;
            }
            return ScheduleBound {
                until: boundary,
                limited_by: LimitedBy::Schedule,
            };
        }
        first_hour = 0;
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    ScheduleBound {
        until: horizon,
        limited_by: LimitedBy::None,
    }
}

/// Whether `window` ends before the schedule closes or the booking horizon runs out.
///
/// Resources without a schedule are bounded by `lookahead` from the window
/// start, scheduled ones by the seven day scan. The refusal carries the bound
/// and its cause.
pub fn schedule_permits(
    schedule: Option<&WeeklySchedule>,
    tz: Tz,
    window: TimeWindow,
    lookahead: Duration,
) -> Result<(), ScheduleBound> {
    let bound = scan_schedule(schedule, tz, window.start, lookahead);
    if window.end > bound.until {
        Err(bound)
    } else {
        Ok(())
    }
}

/// Combine the schedule bound with the competing reservations
pub fn compose_window(
    from: DateTime<Utc>,
    bound: ScheduleBound,
    covering: Option<&Reservation>,
    next: Option<&Reservation>,
    min_booking: Duration,
    tz: Tz,
) -> AvailabilityWindow {
    let (until, limited_by) = if bound.until <= from {
        (from, bound.limited_by)
    } else if covering.is_some() {
        (from, LimitedBy::Booking)
    } else {
        match next {
            Some(r) if r.start_time <= bound.until => (r.start_time, LimitedBy::Booking),
            _ => (bound.until, bound.limited_by),
        }
    };

    let can_book = until - from >= min_booking;
    let reason = if can_book {
        None
    } else if until <= from {
        Some(match limited_by {
            LimitedBy::Booking => "currently booked".to_string(),
            _ => "outside the owner's schedule".to_string(),
        })
    } else {
        Some(format!(
            "available for less than {} minutes",
            min_booking.num_minutes()
        ))
    };

    AvailabilityWindow {
        from,
        available_until: until,
        limited_by,
        can_book,
        message: describe(from, until, limited_by, tz),
        reason,
    }
}

/// Human readable summary in the resource's local time
pub fn describe(from: DateTime<Utc>, until: DateTime<Utc>, limited_by: LimitedBy, tz: Tz) -> String {
    if until <= from {
        return match limited_by {
            LimitedBy::Booking => "not available now (booked)".to_string(),
            LimitedBy::Schedule => "not available now (owner schedule)".to_string(),
            LimitedBy::None => "not available now".to_string(),
        };
    }

    let local_from = from.with_timezone(&tz);
    let local_until = until.with_timezone(&tz);
    let time = local_until.format("%H:%M");
    let base = match (local_until.date_naive() - local_from.date_naive()).num_days() {
        0 => format!("available today until {}", time),
        1 => format!("available until tomorrow at {}", time),
        _ => format!("available until {} at {}", local_until.format("%d/%m"), time),
    };
    let suffix = match limited_by {
        LimitedBy::Schedule => " (owner schedule)",
        LimitedBy::Booking => " (next booking)",
        LimitedBy::None => "",
    };
    format!("{}{}", base, suffix)
}

/// Availability calculator service
pub struct AvailabilityCalculator {
    resources: Arc<dyn ResourceRepository>,
    reservations: Arc<dyn ReservationRepository>,
    config: EngineConfig,
}

impl AvailabilityCalculator {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        reservations: Arc<dyn ReservationRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            resources,
            reservations,
            config,
        }
    }

    /// Time zone the resource's schedule is written in
    pub fn time_zone_of(&self, resource: &ParkingResource) -> Tz {
        resource.time_zone.unwrap_or(self.config.time_zone)
    }

    pub fn min_booking(&self) -> Duration {
        Duration::minutes(self.config.min_booking_minutes)
    }

    /// How far ahead a resource without a schedule can be booked
    pub fn lookahead(&self) -> Duration {
        Duration::hours(self.config.unrestricted_lookahead_hours)
    }

    /// Availability of `resource_id` from `from`.
    ///
    /// Missing, inactive or blocked resources yield a closed window rather
    /// than an error.
    #[instrument(skip(self))]
    pub async fn compute_availability(
        &self,
        resource_id: Uuid,
        from: DateTime<Utc>,
    ) -> AppResult<AvailabilityWindow> {
        match self.resources.find_by_id(resource_id).await? {
            Some(resource) => self.availability_for(&resource, from).await,
            None => {
                debug!("Parking resource {} not found", resource_id);
                Ok(AvailabilityWindow::closed(from, "parking resource not found"))
            }
        }
    }

    /// Availability of an already loaded resource
    pub async fn availability_for(
        &self,
        resource: &ParkingResource,
        from: DateTime<Utc>,
    ) -> AppResult<AvailabilityWindow> {
        if let Some(reason) = resource.unavailable_reason() {
            return Ok(AvailabilityWindow::closed(from, reason));
        }

        let tz = self.time_zone_of(resource);
        let bound = scan_schedule(resource.schedule.as_ref(), tz, from, self.lookahead());

        let (covering, next) = if bound.until > from {
            (
                self.reservations.find_covering(resource.id, from).await?,
                self.reservations
                    .find_next_blocking_after(resource.id, from)
                    .await?,
            )
        } else {
            (None, None)
        };

        let window = compose_window(
            from,
            bound,
            covering.as_ref(),
            next.as_ref(),
            self.min_booking(),
            tz,
        );
        debug!(
            "Resource {} available until {} ({})",
            resource.id, window.available_until, window.limited_by
        );
        Ok(window)
    }
}

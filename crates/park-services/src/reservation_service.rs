//! Reservation service
//!
//! Entry point used by the reservation API layer. Creation runs the whole
//! pipeline: request validation, resource state, vehicle and resource
//! conflicts, owner schedule, pricing, a serialized insert and finally the
//! ledger. Status changes go through conditional updates so they cannot race
//! the expiry sweep; once one has committed, a ledger failure is flagged for
//! reconciliation rather than returned.

use chrono::{DateTime, Duration, Utc};
use park_core::{
    config::EngineConfig,
    models::{
        AvailabilityWindow, CreateReservationRequest, LimitedBy, OperationalFee, ParkingResource,
        Reservation, ReservationStatus, TimeWindow, WindowValidation,
    },
    money::MinorUnits,
    traits::PaymentConfirmation,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::availability::{schedule_permits, AvailabilityCalculator};
use crate::conflict::{ConflictDetector, VehicleIdentity};
use crate::extension::{ExtensionEligibility, ExtensionEngine};
use crate::ledger::{commission_split, LedgerService};
use crate::locks::ResourceLocks;
use crate::pricing::PricingEngine;
use crate::Stores;

/// Reservation service
pub struct ReservationService {
    stores: Stores,
    availability: AvailabilityCalculator,
    conflicts: ConflictDetector,
    pricing: PricingEngine,
    ledger: Arc<LedgerService>,
    extensions: ExtensionEngine,
    locks: Arc<ResourceLocks>,
    config: EngineConfig,
}

impl ReservationService {
    pub fn new(stores: Stores, payments: Arc<dyn PaymentConfirmation>, config: EngineConfig) -> Self {
        let ledger = Arc::new(LedgerService::from_stores(&stores));
        let locks = Arc::new(ResourceLocks::new());
        Self {
            availability: AvailabilityCalculator::new(
                stores.resources.clone(),
                stores.reservations.clone(),
                config.clone(),
            ),
            conflicts: ConflictDetector::new(stores.reservations.clone()),
            pricing: PricingEngine::new(config.pricing_method),
            extensions: ExtensionEngine::new(
                stores.clone(),
                ledger.clone(),
                payments,
                locks.clone(),
                config.clone(),
            ),
            ledger,
            locks,
            stores,
            config,
        }
    }

    pub fn ledger(&self) -> Arc<LedgerService> {
        self.ledger.clone()
    }

    fn min_booking(&self) -> Duration {
        Duration::minutes(self.config.min_booking_minutes)
    }

    async fn load_resource(&self, resource_id: Uuid) -> AppResult<ParkingResource> {
        self.stores
            .resources
            .find_by_id(resource_id)
            .await?
            .ok_or(AppError::ResourceNotFound(resource_id))
    }

    async fn load_reservation(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        self.stores
            .reservations
            .find_by_id(reservation_id)
            .await?
            .ok_or(AppError::ReservationNotFound(reservation_id))
    }

    fn ensure_bookable(resource: &ParkingResource) -> AppResult<()> {
        if !resource.is_active {
            return Err(AppError::ResourceInactive(resource.id));
        }
        if resource.owner_blocked {
            return Err(AppError::OwnerBlocked(resource.id));
        }
        Ok(())
    }

    /// Earliest limit inside `window`: schedule close, booking horizon or a competing booking
    async fn first_limit(
        &self,
        resource: &ParkingResource,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Option<(DateTime<Utc>, LimitedBy, Option<Uuid>)>> {
        let tz = self.availability.time_zone_of(resource);
        let schedule_limit =
            schedule_permits(resource.schedule.as_ref(), tz, window, self.availability.lookahead())
                .err()
                .map(|bound| (bound.until, bound.limited_by, None));

        let booking_limit = self
            .conflicts
            .resource_conflicts(resource.id, window, exclude)
            .await?
            .into_iter()
            .min_by_key(|r| r.start_time)
            .map(|r| (r.start_time.max(window.start), LimitedBy::Booking, Some(r.id)));

        Ok(match (schedule_limit, booking_limit) {
            (Some(s), Some(b)) => Some(if b.0 <= s.0 { b } else { s }),
            (s, b) => s.or(b),
        })
    }

    /// Availability window of a resource from `from`
    pub async fn compute_availability(
        &self,
        resource_id: Uuid,
        from: DateTime<Utc>,
    ) -> AppResult<AvailabilityWindow> {
        self.availability.compute_availability(resource_id, from).await
    }

    /// Check a requested window without creating anything.
    ///
    /// A refused window carries a suggested end when a bookable prefix of at
    /// least the minimum duration exists.
    #[instrument(skip(self))]
    pub async fn validate_window(
        &self,
        resource_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<WindowValidation> {
        let window = TimeWindow::new(start, end);
        if !window.is_well_formed() {
            return Ok(WindowValidation::invalid(
                "invalid_window",
                "end time must be after start time",
            ));
        }
        if window.duration() < self.min_booking() {
            return Ok(WindowValidation::invalid(
                "duration_too_short",
                format!("minimum booking is {} minutes", self.config.min_booking_minutes),
            ));
        }

        let Some(resource) = self.stores.resources.find_by_id(resource_id).await? else {
            return Ok(WindowValidation::invalid("resource_not_found", "parking resource not found"));
        };
        if let Err(e) = Self::ensure_bookable(&resource) {
            let reason = resource.unavailable_reason().unwrap_or("parking resource unavailable");
            return Ok(WindowValidation::invalid(e.error_code(), reason));
        }

        let Some((limit, limited_by, _)) = self.first_limit(&resource, window, None).await? else {
            return Ok(WindowValidation::ok());
        };

        let tz = self.availability.time_zone_of(&resource);
        let local = limit.with_timezone(&tz);
        let (code, error) = match limited_by {
            LimitedBy::Booking => (
                "booking_conflict",
                format!("parking is already booked from {}", local.format("%H:%M")),
            ),
            LimitedBy::Schedule => (
                "schedule_refused",
                format!("owner schedule ends at {}", local.format("%H:%M")),
            ),
            LimitedBy::None => (
                "window_too_long",
                format!("bookable until {} at most", local.format("%d/%m %H:%M")),
            ),
        };
        let mut validation = WindowValidation::invalid(code, error);
        validation.limited_by = Some(limited_by);
        validation.suggested_end = (limit - start >= self.min_booking()).then_some(limit);
        debug!(
            "Window {} - {} on {} refused, limit {} ({})",
            start, end, resource_id, limit, limited_by
        );
        Ok(validation)
    }

    /// Create a reservation and its ledger records.
    ///
    /// The final overlap check and the insert run under the per-resource lock;
    /// the store re-checks the vehicle under its own lock.
    #[instrument(skip(self, request), fields(resource_id = %request.resource_id))]
    pub async fn create_reservation(
        &self,
        request: CreateReservationRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        request.validate()?;
        let window = request.window();
        if !window.is_well_formed() {
            return Err(AppError::InvalidWindow(
                "end time must be after start time".to_string(),
            ));
        }
        if window.end <= now {
            return Err(AppError::InvalidWindow("window has already ended".to_string()));
        }
        if window.duration() < self.min_booking() {
            return Err(AppError::DurationTooShort {
                min_minutes: self.config.min_booking_minutes,
            });
        }

        let resource = self.load_resource(request.resource_id).await?;
        Self::ensure_bookable(&resource)?;

        let vehicle = VehicleIdentity::new(request.vehicle_id, request.license_plate.as_deref());
        let _guard = self.locks.lock(resource.id).await;
        self.conflicts
            .ensure_free(resource.id, &vehicle, window, None)
            .await?;

        let tz = self.availability.time_zone_of(&resource);
        if let Err(bound) =
            schedule_permits(resource.schedule.as_ref(), tz, window, self.availability.lookahead())
        {
            let suggested_end = (bound.until - window.start >= self.min_booking()).then_some(bound.until);
            if bound.limited_by == LimitedBy::Schedule {
                warn!("Window on {} exceeds owner schedule at {}", resource.id, bound.until);
                return Err(AppError::ScheduleRefused {
                    message: format!(
                        "owner schedule ends at {}",
                        bound.until.with_timezone(&tz).format("%H:%M")
                    ),
                    suggested_end,
                });
            }
            warn!("Window on {} runs past the booking horizon {}", resource.id, bound.until);
            return Err(AppError::WindowTooLong {
                max_end: bound.until,
            });
        }

        let breakdown = self.pricing.price_window(&resource, &window);
        let (status, approval_expires_at) = if self.config.auto_confirm {
            (ReservationStatus::Confirmed, None)
        } else {
            (
                ReservationStatus::PendingApproval,
                Some(now + Duration::minutes(self.config.approval_ttl_minutes)),
            )
        };
        let reservation = Reservation {
            id: Uuid::new_v4(),
            resource_id: resource.id,
            requester_id: request.requester_id,
            vehicle_id: request.vehicle_id,
            license_plate: request.license_plate.clone(),
            start_time: window.start,
            end_time: window.end,
            status,
            total_price: breakdown.total,
            approval_expires_at,
            created_at: now,
            updated_at: now,
        };

        let reservation = match self.stores.reservations.insert_if_free(&reservation).await? {
            Ok(stored) => stored,
            Err(conflicting)
                if conflicting.resource_id != resource.id
                    && vehicle.matches(&VehicleIdentity::of(&conflicting)) =>
            {
                warn!("Vehicle was booked concurrently by reservation {}", conflicting.id);
                return Err(AppError::VehicleConflict {
                    reservation_ids: vec![conflicting.id],
                });
            }
            Err(conflicting) => {
                warn!("Insert lost the race to reservation {}", conflicting.id);
                return Err(AppError::BookingConflict {
                    reservation_id: conflicting.id,
                });
            }
        };

        let split = commission_split(
            reservation.total_price,
            resource.price_table.as_ref(),
            resource.hourly_rate,
            window.duration_ms(),
        );
        self.ledger
            .record_creation(&reservation, resource.owner_id, split)
            .await;

        info!(
            "Created reservation {} on {} ({} - {}, {} minor units, {})",
            reservation.id,
            resource.id,
            reservation.start_time,
            reservation.end_time,
            reservation.total_price,
            reservation.status
        );
        Ok(reservation)
    }

    /// Conditionally move `reservation` to `to`
    async fn change_status(
        &self,
        reservation: &Reservation,
        to: ReservationStatus,
    ) -> AppResult<Reservation> {
        let mut updated = reservation.clone();
        updated.transition(to)?;
        let changed = self
            .stores
            .reservations
            .compare_and_set_status(reservation.id, reservation.status, to)
            .await?;
        if !changed {
            let current = self.load_reservation(reservation.id).await?;
            return Err(AppError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(updated)
    }

    /// Cancel a pending or confirmed reservation and release its commission
    #[instrument(skip(self))]
    pub async fn cancel_reservation(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.load_reservation(reservation_id).await?;
        let cancelled = self
            .change_status(&reservation, ReservationStatus::Cancelled)
            .await?;
        match self.ledger.release_or_flag(reservation_id).await {
            Ok(outcome) => info!("Cancelled reservation {} ({:?})", reservation_id, outcome),
            Err(_) => error!(
                "Cancelled reservation {}, commission left for reconciliation",
                reservation_id
            ),
        }
        Ok(cancelled)
    }

    async fn load_for_owner(&self, reservation_id: Uuid, owner_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.load_reservation(reservation_id).await?;
        let resource = self.load_resource(reservation.resource_id).await?;
        if resource.owner_id != owner_id {
            return Err(AppError::Unauthorized(
                "only the resource owner can decide on this reservation".to_string(),
            ));
        }
        Ok(reservation)
    }

    /// Owner approval of a pending reservation.
    ///
    /// A reservation past its approval deadline is expired instead.
    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        reservation_id: Uuid,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let reservation = self.load_for_owner(reservation_id, owner_id).await?;
        let deadline_passed = reservation.status == ReservationStatus::PendingApproval
            && reservation.approval_expires_at.map_or(false, |at| at <= now);
        if deadline_passed {
            self.change_status(&reservation, ReservationStatus::Expired)
                .await?;
            if self.ledger.release_or_flag(reservation_id).await.is_err() {
                error!(
                    "Expired reservation {}, commission left for reconciliation",
                    reservation_id
                );
            }
            warn!("Approval of {} arrived after its deadline", reservation_id);
            return Err(AppError::InvalidTransition {
                from: ReservationStatus::Expired.to_string(),
                to: ReservationStatus::Confirmed.to_string(),
            });
        }

        let confirmed = self
            .change_status(&reservation, ReservationStatus::Confirmed)
            .await?;
        info!("Reservation {} approved by owner", reservation_id);
        Ok(confirmed)
    }

    /// Owner rejection of a pending reservation
    #[instrument(skip(self))]
    pub async fn reject(&self, reservation_id: Uuid, owner_id: Uuid) -> AppResult<Reservation> {
        let reservation = self.load_for_owner(reservation_id, owner_id).await?;
        let rejected = self
            .change_status(&reservation, ReservationStatus::Rejected)
            .await?;
        if self.ledger.release_or_flag(reservation_id).await.is_err() {
            error!(
                "Rejected reservation {}, commission left for reconciliation",
                reservation_id
            );
        }
        info!("Reservation {} rejected by owner", reservation_id);
        Ok(rejected)
    }

    /// Charge `final_charged` after a coupon, keeping the parking-cost baseline
    pub async fn apply_coupon(
        &self,
        reservation_id: Uuid,
        final_charged: MinorUnits,
    ) -> AppResult<OperationalFee> {
        self.load_reservation(reservation_id).await?;
        self.ledger.apply_coupon(reservation_id, final_charged).await
    }

    pub async fn check_extension_eligibility(
        &self,
        reservation_id: Uuid,
        requester_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ExtensionEligibility> {
        self.extensions
            .check_eligibility(reservation_id, requester_id, now)
            .await
    }

    pub async fn execute_extension(
        &self,
        reservation_id: Uuid,
        requester_id: Uuid,
        payment_ref: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        self.extensions
            .execute(reservation_id, requester_id, payment_ref, now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, resource_with_schedule, InMemoryStore};
    use chrono_tz::Tz;
    use park_core::models::{DayKey, Granularity, PriceTable, ReconciliationKind, WeeklySchedule};

    const SUNDAY: (i32, u32, u32) = (2024, 6, 2);

    fn sunday_schedule() -> WeeklySchedule {
        let mut s = WeeklySchedule::empty(Granularity::ThreeHour);
        s.days.insert(DayKey::Sunday, [6u8, 9, 12].into_iter().collect());
        s
    }

    fn utc_config() -> EngineConfig {
        EngineConfig {
            time_zone: Tz::UTC,
            ..Default::default()
        }
    }

    fn request(resource: &ParkingResource, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateReservationRequest {
        CreateReservationRequest {
            resource_id: resource.id,
            requester_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            vehicle_id: None,
            license_plate: None,
        }
    }

    fn setup(config: EngineConfig) -> (Arc<InMemoryStore>, ReservationService, ParkingResource) {
        let store = InMemoryStore::new();
        let mut resource = resource_with_schedule(Some(sunday_schedule()));
        resource.price_table = Some(PriceTable::new(vec![Some(1000), Some(800)]));
        store.add_resource(resource.clone());
        let service = store.reservation_service(config);
        (store, service, resource)
    }

    #[tokio::test]
    async fn test_validate_window_against_schedule() {
        let (_store, service, resource) = setup(utc_config());

        let ok = service
            .validate_window(resource.id, at(SUNDAY, 8, 0), at(SUNDAY, 10, 0))
            .await
            .unwrap();
        assert!(ok.valid);

        let refused = service
            .validate_window(resource.id, at(SUNDAY, 14, 0), at(SUNDAY, 16, 0))
            .await
            .unwrap();
        assert!(!refused.valid);
        assert_eq!(refused.error_code, Some("schedule_refused"));
        assert_eq!(refused.suggested_end, Some(at(SUNDAY, 15, 0)));
        assert_eq!(refused.limited_by, Some(LimitedBy::Schedule));
    }

    #[tokio::test]
    async fn test_validate_window_basic_errors() {
        let (_store, service, resource) = setup(utc_config());

        let v = service
            .validate_window(resource.id, at(SUNDAY, 10, 0), at(SUNDAY, 9, 0))
            .await
            .unwrap();
        assert_eq!(v.error_code, Some("invalid_window"));

        let v = service
            .validate_window(resource.id, at(SUNDAY, 9, 0), at(SUNDAY, 9, 10))
            .await
            .unwrap();
        assert_eq!(v.error_code, Some("duration_too_short"));

        let v = service
            .validate_window(Uuid::new_v4(), at(SUNDAY, 9, 0), at(SUNDAY, 10, 0))
            .await
            .unwrap();
        assert_eq!(v.error_code, Some("resource_not_found"));
    }

    #[tokio::test]
    async fn test_validate_window_earliest_limit_wins() {
        let (store, service, resource) = setup(utc_config());
        let existing = Reservation {
            resource_id: resource.id,
            start_time: at(SUNDAY, 10, 0),
            end_time: at(SUNDAY, 11, 0),
            ..Default::default()
        };
        store.add_reservation(existing);

        let v = service
            .validate_window(resource.id, at(SUNDAY, 8, 0), at(SUNDAY, 16, 0))
            .await
            .unwrap();
        assert_eq!(v.error_code, Some("booking_conflict"));
        assert_eq!(v.suggested_end, Some(at(SUNDAY, 10, 0)));
        assert_eq!(v.limited_by, Some(LimitedBy::Booking));
    }

    #[tokio::test]
    async fn test_create_prices_and_ledgers() {
        let (store, service, resource) = setup(utc_config());
        let created = service
            .create_reservation(
                request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 30)),
                at(SUNDAY, 7, 0),
            )
            .await
            .unwrap();
        assert_eq!(created.total_price, 1400);
        assert_eq!(created.status, ReservationStatus::Confirmed);

        let commission = store.commission_for(created.id).unwrap();
        assert!(commission.is_balanced());
        assert_eq!(commission.owner_id, resource.owner_id);
        let fee = store.fee_for(created.id).unwrap();
        assert_eq!(fee.total_charged, 1540);
    }

    #[tokio::test]
    async fn test_create_rejects_overlap_and_schedule() {
        let (_store, service, resource) = setup(utc_config());
        let now = at(SUNDAY, 7, 0);
        let first = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 10, 0)), now)
            .await
            .unwrap();

        let err = service
            .create_reservation(request(&resource, at(SUNDAY, 9, 0), at(SUNDAY, 11, 0)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookingConflict { reservation_id } if reservation_id == first.id));

        // Touching windows are fine
        service
            .create_reservation(request(&resource, at(SUNDAY, 10, 0), at(SUNDAY, 11, 0)), now)
            .await
            .unwrap();

        let err = service
            .create_reservation(request(&resource, at(SUNDAY, 14, 0), at(SUNDAY, 16, 0)), now)
            .await
            .unwrap_err();
        match err {
            AppError::ScheduleRefused { suggested_end, .. } => {
                assert_eq!(suggested_end, Some(at(SUNDAY, 15, 0)))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let (store, service, mut resource) = setup(utc_config());
        let now = at(SUNDAY, 7, 0);

        let err = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 8, 10)), now)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "duration_too_short");

        let err = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 7, 0)), now)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_window");

        resource.owner_blocked = true;
        store.add_resource(resource.clone());
        let err = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), now)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "owner_blocked");
    }

    #[tokio::test]
    async fn test_vehicle_cannot_double_book() {
        let (store, service, resource) = setup(utc_config());
        let other = resource_with_schedule(None);
        store.add_resource(other.clone());
        let now = at(SUNDAY, 7, 0);

        let mut first = request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 10, 0));
        first.license_plate = Some("12-345-67".to_string());
        service.create_reservation(first, now).await.unwrap();

        let mut second = request(&other, at(SUNDAY, 9, 0), at(SUNDAY, 11, 0));
        second.license_plate = Some("1234567".to_string());
        let err = service.create_reservation(second, now).await.unwrap_err();
        assert_eq!(err.error_code(), "vehicle_conflict");
    }

    #[tokio::test]
    async fn test_concurrent_vehicle_bookings_single_winner() {
        let store = InMemoryStore::new();
        let service = Arc::new(store.reservation_service(utc_config()));
        let now = at(SUNDAY, 7, 0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resource = resource_with_schedule(None);
                store.add_resource(resource.clone());
                let mut req = request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 10, 0));
                req.license_plate = Some(if i % 2 == 0 { "12-345-67" } else { "1234567" }.to_string());
                let service = service.clone();
                tokio::spawn(async move { service.create_reservation(req, now).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.error_code(), "vehicle_conflict"),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_unrestricted_booking_capped_at_lookahead() {
        let (store, service, _) = setup(utc_config());
        let open = resource_with_schedule(None);
        store.add_resource(open.clone());
        let start = at(SUNDAY, 8, 0);
        let year_end = start + Duration::days(365);

        let v = service.validate_window(open.id, start, year_end).await.unwrap();
        assert!(!v.valid);
        assert_eq!(v.error_code, Some("window_too_long"));
        assert_eq!(v.limited_by, Some(LimitedBy::None));
        assert_eq!(v.suggested_end, Some(start + Duration::hours(12)));

        let err = service
            .create_reservation(request(&open, start, year_end), at(SUNDAY, 7, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WindowTooLong { max_end } if max_end == start + Duration::hours(12)));

        let created = service
            .create_reservation(request(&open, start, start + Duration::hours(12)), at(SUNDAY, 7, 0))
            .await
            .unwrap();
        assert_eq!(created.total_price, 12 * 1000);
    }

    #[tokio::test]
    async fn test_scheduled_booking_stops_at_scan_horizon() {
        let (store, service, _) = setup(utc_config());
        let always = resource_with_schedule(Some(WeeklySchedule::full(Granularity::ThreeHour)));
        store.add_resource(always.clone());
        let start = at(SUNDAY, 8, 0);
        let end = start + Duration::days(8);

        let v = service.validate_window(always.id, start, end).await.unwrap();
        assert_eq!(v.error_code, Some("window_too_long"));
        assert_eq!(v.suggested_end, Some(start + Duration::days(7)));

        let err = service
            .create_reservation(request(&always, start, end), at(SUNDAY, 7, 0))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "window_too_long");
        assert!(store.reconciliation_items().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates_single_winner() {
        let (_store, service, resource) = setup(utc_config());
        let service = Arc::new(service);
        let now = at(SUNDAY, 7, 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let req = request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 10, 0));
                tokio::spawn(async move { service.create_reservation(req, now).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_fail_creation() {
        let (store, service, resource) = setup(utc_config());
        store.fail_commission_writes(true);
        let created = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), at(SUNDAY, 7, 0))
            .await
            .unwrap();
        assert!(store.reservation(created.id).is_some());
        assert_eq!(
            store.reconciliation_items()[0].kind,
            ReconciliationKind::LedgerCreateFailed
        );
    }

    #[tokio::test]
    async fn test_cancel_releases_commission() {
        let (store, service, resource) = setup(utc_config());
        let created = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), at(SUNDAY, 7, 0))
            .await
            .unwrap();

        let cancelled = service.cancel_reservation(created.id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(store.commission_for(created.id).is_none());

        let err = service.cancel_reservation(created.id).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_transition");
    }

    #[tokio::test]
    async fn test_cancel_survives_ledger_failure() {
        let (store, service, resource) = setup(utc_config());
        let created = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), at(SUNDAY, 7, 0))
            .await
            .unwrap();
        store.fail_commission_writes(true);

        let cancelled = service.cancel_reservation(created.id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(
            store.reservation(created.id).unwrap().status,
            ReservationStatus::Cancelled
        );
        assert!(store.commission_for(created.id).is_some());
        let items = store.reconciliation_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ReconciliationKind::LedgerReleaseFailed);
        assert_eq!(items[0].entity_id, created.id);
    }

    #[tokio::test]
    async fn test_reject_survives_ledger_failure() {
        let (store, service, resource) = setup(EngineConfig {
            auto_confirm: false,
            ..utc_config()
        });
        let pending = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), at(SUNDAY, 7, 0))
            .await
            .unwrap();
        store.fail_commission_writes(true);

        let rejected = service.reject(pending.id, resource.owner_id).await.unwrap();
        assert_eq!(rejected.status, ReservationStatus::Rejected);
        assert_eq!(
            store.reconciliation_items()[0].kind,
            ReconciliationKind::LedgerReleaseFailed
        );
    }

    #[tokio::test]
    async fn test_manual_approval_flow() {
        let (_store, service, resource) = setup(EngineConfig {
            auto_confirm: false,
            ..utc_config()
        });
        let now = at(SUNDAY, 7, 0);
        let pending = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 0)), now)
            .await
            .unwrap();
        assert_eq!(pending.status, ReservationStatus::PendingApproval);
        assert_eq!(pending.approval_expires_at, Some(now + Duration::minutes(60)));

        let err = service.approve(pending.id, Uuid::new_v4(), now).await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");

        let confirmed = service.approve(pending.id, resource.owner_id, now).await.unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert!(confirmed.approval_expires_at.is_none());

        let err = service.reject(pending.id, resource.owner_id).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_transition");
    }

    #[tokio::test]
    async fn test_late_approval_expires() {
        let (store, service, resource) = setup(EngineConfig {
            auto_confirm: false,
            ..utc_config()
        });
        let now = at(SUNDAY, 6, 0);
        let pending = service
            .create_reservation(request(&resource, at(SUNDAY, 9, 0), at(SUNDAY, 10, 0)), now)
            .await
            .unwrap();

        let err = service
            .approve(pending.id, resource.owner_id, now + Duration::minutes(61))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_transition");
        assert_eq!(
            store.reservation(pending.id).unwrap().status,
            ReservationStatus::Expired
        );
        assert!(store.commission_for(pending.id).is_none());
    }

    #[tokio::test]
    async fn test_coupon_through_service() {
        let (_store, service, resource) = setup(utc_config());
        let created = service
            .create_reservation(request(&resource, at(SUNDAY, 8, 0), at(SUNDAY, 9, 30)), at(SUNDAY, 7, 0))
            .await
            .unwrap();
        let fee = service.apply_coupon(created.id, 1400).await.unwrap();
        assert_eq!(fee.fee_amount, 0);
        assert_eq!(fee.parking_cost, 1400);
    }
}

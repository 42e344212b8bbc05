//! Common traits for repositories and collaborators
//!
//! Defines abstractions for persistence and for the external signals the
//! engine consumes. The storage layer implements the repositories, tests use
//! in-memory doubles.

use crate::error::AppError;
use crate::models::{
    Commission, OperationalFee, OwnerPayout, ParkingResource, PayoutPeriod, PayoutStatus,
    ReconciliationItem, Reservation, ReservationStatus, TimeWindow, WeeklySchedule,
};
use crate::money::MinorUnits;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generic lookup by identifier
#[async_trait]
pub trait Repository<T, ID>: Send + Sync {
    /// Find entity by ID
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, AppError>;
}

/// Parking resource repository
#[async_trait]
pub trait ResourceRepository: Repository<ParkingResource, Uuid> {
    /// Replace the stored schedule (granularity included)
    async fn update_schedule(
        &self,
        id: Uuid,
        schedule: Option<&WeeklySchedule>,
    ) -> Result<(), AppError>;
}

/// Reservation repository
///
/// Every range query only returns blocking (non-terminal) reservations.
#[async_trait]
pub trait ReservationRepository: Repository<Reservation, Uuid> {
    /// Blocking reservation on `resource_id` whose window contains `at`
    async fn find_covering(
        &self,
        resource_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>, AppError>;

    /// Earliest blocking reservation on `resource_id` starting strictly after `after`
    async fn find_next_blocking_after(
        &self,
        resource_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Option<Reservation>, AppError>;

    /// Blocking reservations on `resource_id` overlapping `window`
    async fn find_overlapping(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Reservation>, AppError>;

    /// Blocking reservations on any resource, for the same vehicle, overlapping `window`.
    ///
    /// A reservation matches when it carries the same `vehicle_id` or the same
    /// normalized license plate.
    async fn find_vehicle_overlapping(
        &self,
        vehicle_id: Option<Uuid>,
        normalized_plate: Option<&str>,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Reservation>, AppError>;

    /// Insert `reservation` unless a blocking reservation overlaps it on the
    /// same resource or for the same vehicle (vehicle id or normalized plate).
    /// Check and insert are serialized per resource and per vehicle.
    ///
    /// Returns the conflicting reservation instead of inserting, if any.
    async fn insert_if_free(&self, reservation: &Reservation)
        -> Result<Result<Reservation, Reservation>, AppError>;

    /// Store a new end and price for `reservation` unless another blocking
    /// reservation overlaps the updated window. Serialized with `insert_if_free`.
    ///
    /// Returns the conflicting reservation instead of updating, if any.
    async fn extend_if_free(&self, reservation: &Reservation)
        -> Result<Result<Reservation, Reservation>, AppError>;

    /// Pending reservations whose approval deadline is at or before `now`
    async fn find_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, AppError>;

    /// Conditional status change; false when the stored status was not `from`
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool, AppError>;
}

/// Commission repository
#[async_trait]
pub trait CommissionRepository: Send + Sync {
    async fn find_by_reservation(&self, reservation_id: Uuid)
        -> Result<Option<Commission>, AppError>;

    async fn create(&self, commission: &Commission) -> Result<Commission, AppError>;

    async fn update(&self, commission: &Commission) -> Result<Commission, AppError>;

    /// Delete by reservation; true when a record was removed
    async fn delete_by_reservation(&self, reservation_id: Uuid) -> Result<bool, AppError>;

    /// Unprocessed commissions calculated inside `period`, all owners
    async fn find_unprocessed_in_period(
        &self,
        period: PayoutPeriod,
    ) -> Result<Vec<Commission>, AppError>;

    /// Commissions of one owner calculated inside `period`
    async fn list_by_owner_period(
        &self,
        owner_id: Uuid,
        period: PayoutPeriod,
    ) -> Result<Vec<Commission>, AppError>;

    /// Every commission calculated inside `period`
    async fn list_for_period(&self, period: PayoutPeriod) -> Result<Vec<Commission>, AppError>;
}

/// Operational fee repository
#[async_trait]
pub trait OperationalFeeRepository: Send + Sync {
    async fn find_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<OperationalFee>, AppError>;

    async fn create(&self, fee: &OperationalFee) -> Result<OperationalFee, AppError>;

    async fn update(&self, fee: &OperationalFee) -> Result<OperationalFee, AppError>;

    async fn delete_by_reservation(&self, reservation_id: Uuid) -> Result<bool, AppError>;
}

/// Owner payout repository
#[async_trait]
pub trait PayoutRepository: Repository<OwnerPayout, Uuid> {
    /// Insert the payout and mark `commission_ids` processed, atomically.
    ///
    /// Only commissions still unprocessed are claimed; the payout totals are
    /// taken from the caller.
    async fn create_with_commissions(
        &self,
        payout: &OwnerPayout,
        commission_ids: &[Uuid],
    ) -> Result<OwnerPayout, AppError>;

    async fn update_status(
        &self,
        id: Uuid,
        status: PayoutStatus,
        external_reference: Option<&str>,
        notes: Option<&str>,
    ) -> Result<OwnerPayout, AppError>;

    async fn list_by_period(&self, period: PayoutPeriod) -> Result<Vec<OwnerPayout>, AppError>;
}

/// Reconciliation item repository
#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    async fn record(&self, item: &ReconciliationItem) -> Result<(), AppError>;

    /// Oldest unresolved items first
    async fn list_unresolved(&self, limit: i64) -> Result<Vec<ReconciliationItem>, AppError>;

    /// Mark an item handled; false when unknown or already resolved
    async fn resolve(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Single-runner guard for periodic jobs
#[async_trait]
pub trait SweepLock: Send + Sync {
    /// Try to become the only runner of `job`; false when another runner holds it
    async fn try_acquire(&self, job: &str) -> Result<bool, AppError>;

    async fn release(&self, job: &str) -> Result<(), AppError>;
}

/// External payment confirmation signal
#[async_trait]
pub trait PaymentConfirmation: Send + Sync {
    /// Whether `payment_ref` is a confirmed payment of `amount` for `reservation_id`
    async fn is_confirmed(
        &self,
        reservation_id: Uuid,
        payment_ref: &str,
        amount: MinorUnits,
    ) -> Result<bool, AppError>;
}

//! Conflict detector
//!
//! Overlap checks on the half-open `[start, end)` windows of blocking
//! reservations, per resource and per physical vehicle.

use park_core::{
    models::{normalize_plate, Reservation, TimeWindow},
    traits::ReservationRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// `a` and `b` share at least one instant
pub fn overlaps(a: &TimeWindow, b: &TimeWindow) -> bool {
    a.overlaps(b)
}

/// Identity of a physical vehicle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub vehicle_id: Option<Uuid>,
    /// Normalized plate
    pub plate: Option<String>,
}

impl VehicleIdentity {
    pub fn new(vehicle_id: Option<Uuid>, license_plate: Option<&str>) -> Self {
        Self {
            vehicle_id,
            plate: license_plate
                .map(normalize_plate)
                .filter(|p| !p.is_empty()),
        }
    }

    pub fn of(reservation: &Reservation) -> Self {
        Self::new(reservation.vehicle_id, reservation.license_plate.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.vehicle_id.is_none() && self.plate.is_none()
    }

    /// Same vehicle reference or same normalized plate
    pub fn matches(&self, other: &VehicleIdentity) -> bool {
        let same_id = matches!((self.vehicle_id, other.vehicle_id), (Some(a), Some(b)) if a == b);
        let same_plate = matches!((&self.plate, &other.plate), (Some(a), Some(b)) if a == b);
        same_id || same_plate
    }
}

/// Conflict detector service
pub struct ConflictDetector {
    reservations: Arc<dyn ReservationRepository>,
}

impl ConflictDetector {
    pub fn new(reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { reservations }
    }

    /// Blocking reservations on `resource_id` overlapping `window`
    #[instrument(skip(self))]
    pub async fn resource_conflicts(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        let found = self
            .reservations
            .find_overlapping(resource_id, window, exclude)
            .await?;
        debug!("{} overlapping reservations on {}", found.len(), resource_id);
        Ok(found)
    }

    /// Blocking reservations on any resource held by the same vehicle during `window`
    #[instrument(skip(self))]
    pub async fn vehicle_conflicts(
        &self,
        vehicle: &VehicleIdentity,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        if vehicle.is_empty() {
            return Ok(Vec::new());
        }
        self.reservations
            .find_vehicle_overlapping(vehicle.vehicle_id, vehicle.plate.as_deref(), window, exclude)
            .await
    }

    /// Fail with the first conflicting reservation, resource conflicts first
    pub async fn ensure_free(
        &self,
        resource_id: Uuid,
        vehicle: &VehicleIdentity,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        if let Some(existing) = self
            .resource_conflicts(resource_id, window, exclude)
            .await?
            .into_iter()
            .next()
        {
            warn!("Window overlaps reservation {} on {}", existing.id, resource_id);
            return Err(AppError::BookingConflict {
                reservation_id: existing.id,
            });
        }

        let vehicle_conflicts = self.vehicle_conflicts(vehicle, window, exclude).await?;
        if !vehicle_conflicts.is_empty() {
            warn!(
                "Vehicle already holds {} overlapping reservations",
                vehicle_conflicts.len()
            );
            return Err(AppError::VehicleConflict {
                reservation_ids: vehicle_conflicts.iter().map(|r| r.id).collect(),
            });
        }
        Ok(())
    }
}

//! In-memory repositories shared by the service tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use park_core::{
    config::EngineConfig,
    models::{
        normalize_plate, Commission, OperationalFee, OwnerPayout, ParkingResource, PayoutPeriod,
        PayoutStatus, ReconciliationItem, Reservation, ReservationStatus, TimeWindow,
        WeeklySchedule,
    },
    money::MinorUnits,
    traits::{
        CommissionRepository, OperationalFeeRepository, PaymentConfirmation, PayoutRepository,
        ReconciliationRepository, Repository, ReservationRepository, ResourceRepository,
    },
    AppError, AppResult,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::availability::AvailabilityCalculator;
use crate::extension::ExtensionEngine;
use crate::ledger::LedgerService;
use crate::locks::ResourceLocks;
use crate::reservation_service::ReservationService;
use crate::schedule_migration::ScheduleMigrationService;
use crate::Stores;

pub fn at((year, month, day): (i32, u32, u32), hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

pub fn resource_with_schedule(schedule: Option<WeeklySchedule>) -> ParkingResource {
    ParkingResource {
        hourly_rate: 1000,
        schedule,
        ..Default::default()
    }
}

#[derive(Default)]
struct State {
    resources: HashMap<Uuid, ParkingResource>,
    reservations: HashMap<Uuid, Reservation>,
    /// Keyed by reservation id
    commissions: HashMap<Uuid, Commission>,
    /// Keyed by reservation id
    fees: HashMap<Uuid, OperationalFee>,
    payouts: HashMap<Uuid, OwnerPayout>,
    reconciliation: Vec<ReconciliationItem>,
    confirmed_payments: HashSet<String>,
    fail_commission_writes: bool,
    fail_extensions: bool,
    failing_payout_owners: HashSet<Uuid>,
}

impl State {
    fn blocking_overlaps(&self, resource_id: Uuid, window: TimeWindow, exclude: Option<Uuid>) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.resource_id == resource_id)
            .filter(|r| r.status.is_blocking())
            .filter(|r| Some(r.id) != exclude)
            .filter(|r| r.window().overlaps(&window))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        found
    }

    fn vehicle_overlaps(
        &self,
        vehicle_id: Option<Uuid>,
        normalized_plate: Option<&str>,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.status.is_blocking() && Some(r.id) != exclude)
            .filter(|r| r.window().overlaps(&window))
            .filter(|r| {
                let same_vehicle = vehicle_id.is_some() && r.vehicle_id == vehicle_id;
                let same_plate = match (normalized_plate, r.license_plate.as_deref()) {
                    (Some(plate), Some(stored)) => !plate.is_empty() && normalize_plate(stored) == plate,
                    _ => false,
                };
                same_vehicle || same_plate
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| r.start_time);
        found
    }
}

/// Single store implementing every repository trait
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            resources: self.clone(),
            reservations: self.clone(),
            commissions: self.clone(),
            fees: self.clone(),
            payouts: self.clone(),
            reconciliation: self.clone(),
        }
    }

    pub fn availability(self: &Arc<Self>, config: EngineConfig) -> AvailabilityCalculator {
        AvailabilityCalculator::new(self.clone(), self.clone(), config)
    }

    pub fn ledger(self: &Arc<Self>) -> LedgerService {
        LedgerService::from_stores(&self.stores())
    }

    pub fn extension_engine(self: &Arc<Self>, config: EngineConfig) -> ExtensionEngine {
        ExtensionEngine::new(
            self.stores(),
            Arc::new(self.ledger()),
            self.clone(),
            Arc::new(ResourceLocks::new()),
            config,
        )
    }

    pub fn reservation_service(self: &Arc<Self>, config: EngineConfig) -> ReservationService {
        ReservationService::new(self.stores(), self.clone(), config)
    }

    pub fn schedule_migration(self: &Arc<Self>) -> ScheduleMigrationService {
        ScheduleMigrationService::new(self.clone(), self.clone())
    }

    pub fn add_resource(&self, resource: ParkingResource) {
        self.state.lock().resources.insert(resource.id, resource);
    }

    pub fn add_reservation(&self, reservation: Reservation) {
        self.state.lock().reservations.insert(reservation.id, reservation);
    }

    pub fn add_commission(&self, commission: Commission) {
        self.state
            .lock()
            .commissions
            .insert(commission.reservation_id, commission);
    }

    pub fn resource(&self, id: Uuid) -> Option<ParkingResource> {
        self.state.lock().resources.get(&id).cloned()
    }

    pub fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.state.lock().reservations.get(&id).cloned()
    }

    pub fn commission_for(&self, reservation_id: Uuid) -> Option<Commission> {
        self.state.lock().commissions.get(&reservation_id).cloned()
    }

    pub fn fee_for(&self, reservation_id: Uuid) -> Option<OperationalFee> {
        self.state.lock().fees.get(&reservation_id).cloned()
    }

    pub fn reconciliation_items(&self) -> Vec<ReconciliationItem> {
        self.state.lock().reconciliation.clone()
    }

    pub fn mark_commission_processed(&self, reservation_id: Uuid, payout_id: Uuid) {
        if let Some(c) = self.state.lock().commissions.get_mut(&reservation_id) {
            c.payout_processed = true;
            c.payout_id = Some(payout_id);
        }
    }

    pub fn confirm_payment(&self, payment_ref: &str) {
        self.state
            .lock()
            .confirmed_payments
            .insert(payment_ref.to_string());
    }

    pub fn fail_commission_writes(&self, fail: bool) {
        self.state.lock().fail_commission_writes = fail;
    }

    pub fn fail_extensions(&self, fail: bool) {
        self.state.lock().fail_extensions = fail;
    }

    pub fn fail_payouts_for(&self, owner_id: Uuid) {
        self.state.lock().failing_payout_owners.insert(owner_id);
    }
}

fn simulated(what: &str) -> AppError {
    AppError::Database(format!("simulated {} failure", what))
}

#[async_trait]
impl Repository<ParkingResource, Uuid> for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ParkingResource>> {
        Ok(self.resource(id))
    }
}

#[async_trait]
impl ResourceRepository for InMemoryStore {
    async fn update_schedule(&self, id: Uuid, schedule: Option<&WeeklySchedule>) -> AppResult<()> {
        let mut state = self.state.lock();
        let resource = state
            .resources
            .get_mut(&id)
            .ok_or(AppError::ResourceNotFound(id))?;
        resource.schedule = schedule.cloned();
        resource.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl Repository<Reservation, Uuid> for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self.reservation(id))
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore {
    async fn find_covering(&self, resource_id: Uuid, at: DateTime<Utc>) -> AppResult<Option<Reservation>> {
        let state = self.state.lock();
        Ok(state
            .reservations
            .values()
            .find(|r| {
                r.resource_id == resource_id
                    && r.status.is_blocking()
                    && r.start_time <= at
                    && at < r.end_time
            })
            .cloned())
    }

    async fn find_next_blocking_after(
        &self,
        resource_id: Uuid,
        after: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let state = self.state.lock();
        Ok(state
            .reservations
            .values()
            .filter(|r| r.resource_id == resource_id && r.status.is_blocking() && r.start_time > after)
            .min_by_key(|r| r.start_time)
            .cloned())
    }

    async fn find_overlapping(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        Ok(self.state.lock().blocking_overlaps(resource_id, window, exclude))
    }

    async fn find_vehicle_overlapping(
        &self,
        vehicle_id: Option<Uuid>,
        normalized_plate: Option<&str>,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .vehicle_overlaps(vehicle_id, normalized_plate, window, exclude))
    }

    async fn insert_if_free(&self, reservation: &Reservation) -> AppResult<Result<Reservation, Reservation>> {
        let mut state = self.state.lock();
        if let Some(conflict) = state
            .blocking_overlaps(reservation.resource_id, reservation.window(), None)
            .into_iter()
            .next()
        {
            return Ok(Err(conflict));
        }
        let plate = reservation.license_plate.as_deref().map(normalize_plate);
        if let Some(conflict) = state
            .vehicle_overlaps(reservation.vehicle_id, plate.as_deref(), reservation.window(), None)
            .into_iter()
            .next()
        {
            return Ok(Err(conflict));
        }
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(Ok(reservation.clone()))
    }

    async fn extend_if_free(&self, reservation: &Reservation) -> AppResult<Result<Reservation, Reservation>> {
        let mut state = self.state.lock();
        if state.fail_extensions {
            return Err(simulated("reservation extend"));
        }
        if let Some(conflict) = state
            .blocking_overlaps(reservation.resource_id, reservation.window(), Some(reservation.id))
            .into_iter()
            .next()
        {
            return Ok(Err(conflict));
        }
        let stored = state
            .reservations
            .get_mut(&reservation.id)
            .filter(|r| r.status.is_blocking())
            .ok_or(AppError::ReservationNotFound(reservation.id))?;
        stored.end_time = reservation.end_time;
        stored.total_price = reservation.total_price;
        stored.updated_at = reservation.updated_at;
        Ok(Ok(stored.clone()))
    }

    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let state = self.state.lock();
        Ok(state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::PendingApproval)
            .filter(|r| r.approval_expires_at.map_or(false, |at| at <= now))
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.reservations.get_mut(&id) {
            Some(r) if r.status == from => {
                r.status = to;
                if to != ReservationStatus::PendingApproval {
                    r.approval_expires_at = None;
                }
                r.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::ReservationNotFound(id)),
        }
    }
}

#[async_trait]
impl CommissionRepository for InMemoryStore {
    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<Commission>> {
        Ok(self.commission_for(reservation_id))
    }

    async fn create(&self, commission: &Commission) -> AppResult<Commission> {
        let mut state = self.state.lock();
        if state.fail_commission_writes {
            return Err(simulated("commission insert"));
        }
        state
            .commissions
            .insert(commission.reservation_id, commission.clone());
        Ok(commission.clone())
    }

    async fn update(&self, commission: &Commission) -> AppResult<Commission> {
        let mut state = self.state.lock();
        if state.fail_commission_writes {
            return Err(simulated("commission update"));
        }
        state
            .commissions
            .insert(commission.reservation_id, commission.clone());
        Ok(commission.clone())
    }

    async fn delete_by_reservation(&self, reservation_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock();
        if state.fail_commission_writes {
            return Err(simulated("commission delete"));
        }
        let unprocessed = state
            .commissions
            .get(&reservation_id)
            .map_or(false, |c| !c.payout_processed);
        if unprocessed {
            state.commissions.remove(&reservation_id);
        }
        Ok(unprocessed)
    }

    async fn find_unprocessed_in_period(&self, period: PayoutPeriod) -> AppResult<Vec<Commission>> {
        let state = self.state.lock();
        Ok(state
            .commissions
            .values()
            .filter(|c| !c.payout_processed && period.contains(c.calculated_at))
            .cloned()
            .collect())
    }

    async fn list_by_owner_period(&self, owner_id: Uuid, period: PayoutPeriod) -> AppResult<Vec<Commission>> {
        let state = self.state.lock();
        Ok(state
            .commissions
            .values()
            .filter(|c| c.owner_id == owner_id && period.contains(c.calculated_at))
            .cloned()
            .collect())
    }

    async fn list_for_period(&self, period: PayoutPeriod) -> AppResult<Vec<Commission>> {
        let state = self.state.lock();
        Ok(state
            .commissions
            .values()
            .filter(|c| period.contains(c.calculated_at))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OperationalFeeRepository for InMemoryStore {
    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<OperationalFee>> {
        Ok(self.fee_for(reservation_id))
    }

    async fn create(&self, fee: &OperationalFee) -> AppResult<OperationalFee> {
        self.state.lock().fees.insert(fee.reservation_id, fee.clone());
        Ok(fee.clone())
    }

    async fn update(&self, fee: &OperationalFee) -> AppResult<OperationalFee> {
        self.state.lock().fees.insert(fee.reservation_id, fee.clone());
        Ok(fee.clone())
    }

    async fn delete_by_reservation(&self, reservation_id: Uuid) -> AppResult<bool> {
        Ok(self.state.lock().fees.remove(&reservation_id).is_some())
    }
}

#[async_trait]
impl Repository<OwnerPayout, Uuid> for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<OwnerPayout>> {
        Ok(self.state.lock().payouts.get(&id).cloned())
    }
}

#[async_trait]
impl PayoutRepository for InMemoryStore {
    async fn create_with_commissions(
        &self,
        payout: &OwnerPayout,
        commission_ids: &[Uuid],
    ) -> AppResult<OwnerPayout> {
        let mut state = self.state.lock();
        if state.failing_payout_owners.contains(&payout.owner_id) {
            return Err(simulated("payout insert"));
        }
        let claimable: Vec<Uuid> = state
            .commissions
            .iter()
            .filter(|(_, c)| commission_ids.contains(&c.id) && !c.payout_processed)
            .map(|(reservation_id, _)| *reservation_id)
            .collect();
        if claimable.len() != commission_ids.len() {
            return Err(AppError::Transaction(format!(
                "claimed {} of {} commissions",
                claimable.len(),
                commission_ids.len()
            )));
        }
        for reservation_id in claimable {
            if let Some(c) = state.commissions.get_mut(&reservation_id) {
                c.payout_processed = true;
                c.payout_id = Some(payout.id);
            }
        }
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout.clone())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: PayoutStatus,
        external_reference: Option<&str>,
        notes: Option<&str>,
    ) -> AppResult<OwnerPayout> {
        let mut state = self.state.lock();
        let payout = state.payouts.get_mut(&id).ok_or(AppError::PayoutNotFound(id))?;
        payout.status = status;
        if let Some(reference) = external_reference {
            payout.external_reference = Some(reference.to_string());
        }
        if let Some(notes) = notes {
            payout.notes = Some(notes.to_string());
        }
        payout.updated_at = Utc::now();
        Ok(payout.clone())
    }

    async fn list_by_period(&self, period: PayoutPeriod) -> AppResult<Vec<OwnerPayout>> {
        let state = self.state.lock();
        Ok(state
            .payouts
            .values()
            .filter(|p| p.period == period)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReconciliationRepository for InMemoryStore {
    async fn record(&self, item: &ReconciliationItem) -> AppResult<()> {
        self.state.lock().reconciliation.push(item.clone());
        Ok(())
    }

    async fn list_unresolved(&self, limit: i64) -> AppResult<Vec<ReconciliationItem>> {
        let state = self.state.lock();
        Ok(state
            .reconciliation
            .iter()
            .filter(|i| !i.resolved)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn resolve(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock();
        match state.reconciliation.iter_mut().find(|i| i.id == id && !i.resolved) {
            Some(item) => {
                item.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentConfirmation for InMemoryStore {
    async fn is_confirmed(
        &self,
        _reservation_id: Uuid,
        payment_ref: &str,
        _amount: MinorUnits,
    ) -> AppResult<bool> {
        Ok(self.state.lock().confirmed_payments.contains(payment_ref))
    }
}

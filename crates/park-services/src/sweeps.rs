//! Periodic sweeps
//!
//! - Expiry: pending reservations past their approval deadline become
//!   `expired` and release their commission.
//! - Payout: unprocessed commissions of the previous calendar month are
//!   grouped by owner into one payout each.
//!
//! Each sweep runs under a single-runner guard and is idempotent: expired
//! reservations and processed commissions are skipped on the next run.
//! Failures are collected per item and never abort the batch.

use chrono::{DateTime, Utc};
use park_core::{
    config::SweepConfig,
    models::{Commission, OwnerPayout, PayoutPeriod, PayoutStatus, ReservationStatus},
    traits::SweepLock,
    AppError, AppResult,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::constants::{EXPIRY_SWEEP_JOB, PAYOUT_SWEEP_JOB};
use crate::ledger::LedgerService;
use crate::Stores;

/// Failure of one item inside a sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub entity_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpirySweepReport {
    pub examined: usize,
    pub expired: Vec<Uuid>,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutSweepReport {
    pub period: PayoutPeriod,
    pub payouts: Vec<OwnerPayout>,
    /// Failures keyed by owner
    pub failures: Vec<SweepFailure>,
}

impl PayoutSweepReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Sum of a set of commissions, as a pending payout
fn build_payout(owner_id: Uuid, period: PayoutPeriod, commissions: &[Commission], notes: Option<String>) -> OwnerPayout {
    let now = Utc::now();
    OwnerPayout {
        id: Uuid::new_v4(),
        owner_id,
        period,
        gross_amount: commissions.iter().map(|c| c.parking_cost).sum(),
        commission_amount: commissions.iter().map(|c| c.commission_amount).sum(),
        net_amount: commissions.iter().map(|c| c.net_owner_amount).sum(),
        commission_count: i32::try_from(commissions.len()).unwrap_or(i32::MAX),
        status: PayoutStatus::Pending,
        external_reference: None,
        notes,
        created_at: now,
        updated_at: now,
    }
}

/// Sweep service
pub struct SweepService {
    stores: Stores,
    ledger: Arc<LedgerService>,
    lock: Arc<dyn SweepLock>,
    config: SweepConfig,
}

impl SweepService {
    pub fn new(stores: Stores, lock: Arc<dyn SweepLock>, config: SweepConfig) -> Self {
        Self {
            ledger: Arc::new(LedgerService::from_stores(&stores)),
            stores,
            lock,
            config,
        }
    }

    /// Run `job` under the sweep lock, releasing it whatever the outcome
    async fn guarded<T, F>(&self, job: &str, run: F) -> AppResult<T>
    where
        F: std::future::Future<Output = AppResult<T>>,
    {
        if !self.lock.try_acquire(job).await? {
            return Err(AppError::SweepBusy(job.to_string()));
        }
        let result = run.await;
        if let Err(e) = self.lock.release(job).await {
            warn!("Failed to release {} sweep lock: {}", job, e);
        }
        result
    }

    /// Expire pending reservations whose approval deadline passed
    #[instrument(skip(self))]
    pub async fn run_expiry_sweep(&self, now: DateTime<Utc>) -> AppResult<ExpirySweepReport> {
        self.guarded(EXPIRY_SWEEP_JOB, self.expire_pending(now)).await
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> AppResult<ExpirySweepReport> {
        let candidates = self.stores.reservations.find_expired_pending(now).await?;
        let mut report = ExpirySweepReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for reservation in candidates {
            let changed = self
                .stores
                .reservations
                .compare_and_set_status(
                    reservation.id,
                    ReservationStatus::PendingApproval,
                    ReservationStatus::Expired,
                )
                .await;
            match changed {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Reservation {} changed status before expiry", reservation.id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to expire reservation {}: {}", reservation.id, e);
                    report.failures.push(SweepFailure {
                        entity_id: reservation.id,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            if let Err(e) = self.ledger.release_or_flag(reservation.id).await {
                report.failures.push(SweepFailure {
                    entity_id: reservation.id,
                    error: e.to_string(),
                });
            }
            report.expired.push(reservation.id);
        }

        if !report.expired.is_empty() || !report.failures.is_empty() {
            info!(
                "Expiry sweep: {} expired, {} failures",
                report.expired.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Batch the previous month's unprocessed commissions into owner payouts
    #[instrument(skip(self))]
    pub async fn run_payout_sweep(&self, now: DateTime<Utc>) -> AppResult<PayoutSweepReport> {
        let period = PayoutPeriod::previous_month(now);
        self.guarded(PAYOUT_SWEEP_JOB, self.batch_payouts(period)).await
    }

    async fn batch_payouts(&self, period: PayoutPeriod) -> AppResult<PayoutSweepReport> {
        let unprocessed = self.stores.commissions.find_unprocessed_in_period(period).await?;
        let mut by_owner: BTreeMap<Uuid, Vec<Commission>> = BTreeMap::new();
        for commission in unprocessed {
            by_owner.entry(commission.owner_id).or_default().push(commission);
        }

        let mut report = PayoutSweepReport {
            period,
            payouts: Vec::new(),
            failures: Vec::new(),
        };
        if by_owner.is_empty() {
            debug!("No unprocessed commissions for {}", period);
            return Ok(report);
        }

        for (owner_id, commissions) in by_owner {
            match self.create_payout(owner_id, period, &commissions, None).await {
                Ok(payout) => report.payouts.push(payout),
                Err(e) => {
                    error!("Payout for owner {} in {} failed: {}", owner_id, period, e);
                    report.failures.push(SweepFailure {
                        entity_id: owner_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Payout sweep for {}: {} payouts, {} failures",
            period,
            report.payouts.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn create_payout(
        &self,
        owner_id: Uuid,
        period: PayoutPeriod,
        commissions: &[Commission],
        notes: Option<String>,
    ) -> AppResult<OwnerPayout> {
        let payout = build_payout(owner_id, period, commissions, notes);
        let ids: Vec<Uuid> = commissions.iter().map(|c| c.id).collect();
        let payout = self
            .stores
            .payouts
            .create_with_commissions(&payout, &ids)
            .await?;
        info!(
            "Payout {} for owner {}: {} commissions, net {}",
            payout.id, owner_id, payout.commission_count, payout.net_amount
        );
        Ok(payout)
    }

    /// On-demand payout of one owner's unprocessed commissions for a month.
    ///
    /// Returns `None` when nothing is left to pay.
    #[instrument(skip(self))]
    pub async fn process_payout(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
        notes: Option<String>,
    ) -> AppResult<Option<OwnerPayout>> {
        let period = PayoutPeriod::new(year, month)?;
        let commissions: Vec<Commission> = self
            .stores
            .commissions
            .list_by_owner_period(owner_id, period)
            .await?
            .into_iter()
            .filter(|c| !c.payout_processed)
            .collect();
        if commissions.is_empty() {
            debug!("Nothing to pay owner {} for {}", owner_id, period);
            return Ok(None);
        }
        self.create_payout(owner_id, period, &commissions, notes)
            .await
            .map(Some)
    }

    /// Move a payout along its lifecycle
    #[instrument(skip(self))]
    pub async fn set_payout_status(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        external_reference: Option<&str>,
        notes: Option<&str>,
    ) -> AppResult<OwnerPayout> {
        let mut payout = self
            .stores
            .payouts
            .find_by_id(payout_id)
            .await?
            .ok_or(AppError::PayoutNotFound(payout_id))?;
        payout.transition(status)?;
        let payout = self
            .stores
            .payouts
            .update_status(payout_id, status, external_reference, notes)
            .await?;
        info!("Payout {} is now {}", payout_id, payout.status);
        Ok(payout)
    }

    /// Payouts created for a month
    pub async fn payouts_for_month(&self, year: i32, month: u32) -> AppResult<Vec<OwnerPayout>> {
        let period = PayoutPeriod::new(year, month)?;
        self.stores.payouts.list_by_period(period).await
    }

    /// Start both sweep loops; they run until the handles are aborted
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let expiry = {
            let service = self.clone();
            let period = Duration::from_secs(self.config.expiry_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    match service.run_expiry_sweep(Utc::now()).await {
                        Ok(_) => {}
                        Err(AppError::SweepBusy(_)) => debug!("Expiry sweep held elsewhere"),
                        Err(e) => error!("Expiry sweep failed: {}", e),
                    }
                }
            })
        };

        let payout = {
            let service = self.clone();
            let period = Duration::from_secs(self.config.payout_interval_secs.max(1));
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    match service.run_payout_sweep(Utc::now()).await {
                        Ok(report) if report.is_partial() => warn!(
                            "Payout sweep for {} partially failed: {} owners",
                            report.period,
                            report.failures.len()
                        ),
                        Ok(_) => {}
                        Err(AppError::SweepBusy(_)) => debug!("Payout sweep held elsewhere"),
                        Err(e) => error!("Payout sweep failed: {}", e),
                    }
                }
            })
        };

        info!(
            "Sweeps started (expiry every {}s, payout every {}s)",
            self.config.expiry_interval_secs, self.config.payout_interval_secs
        );
        vec![expiry, payout]
    }
}

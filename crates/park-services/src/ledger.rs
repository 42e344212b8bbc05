//! Commission and operational fee ledger
//!
//! The platform keeps 15% of the parking-cost-only amount as commission and
//! charges the requester a 10% operational fee on top of it. Ledger writes
//! never fail the reservation they belong to: a failed write is logged and
//! recorded as a reconciliation item instead.

use chrono::Utc;
use park_core::{
    models::{
        Commission, CommissionLine, OperationalFee, PayoutPeriod, PriceTable, ReconciliationItem,
        ReconciliationKind, Reservation, COMMISSION_RATE, OPERATIONAL_FEE_RATE,
    },
    money::{apply_rate, MinorUnits},
    traits::{CommissionRepository, OperationalFeeRepository, ReconciliationRepository},
    AppError, AppResult,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::pricing::{ceil_hours, ExtensionQuote};
use crate::Stores;

/// Commission split of a parking cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionSplit {
    pub commission: MinorUnits,
    pub net_owner: MinorUnits,
    pub breakdown: Option<Vec<CommissionLine>>,
}

/// Commission on `parking_cost`.
///
/// With a price table the commission is summed per hour tier over the
/// rounded-up duration and capped at the parking cost; otherwise it is a flat
/// share of the cost.
pub fn commission_split(
    parking_cost: MinorUnits,
    table: Option<&PriceTable>,
    flat_rate: MinorUnits,
    duration_ms: i64,
) -> CommissionSplit {
    let (commission, breakdown) = match table.filter(|t| !t.is_empty()) {
        Some(table) => {
            let lines: Vec<CommissionLine> = (1..=ceil_hours(duration_ms))
                .map(|hour| {
                    let tier_price = table.price_for_hour(hour as usize, flat_rate);
                    CommissionLine {
                        hour,
                        tier_price,
                        commission: apply_rate(tier_price, COMMISSION_RATE),
                    }
                })
                .collect();
            let total: MinorUnits = lines.iter().map(|l| l.commission).sum();
            (total.min(parking_cost), Some(lines))
        }
        None => (apply_rate(parking_cost, COMMISSION_RATE), None),
    };

    CommissionSplit {
        commission,
        net_owner: parking_cost - commission,
        breakdown,
    }
}

/// Operational fee on `parking_cost`, returned as `(fee, total_charged)`
pub fn operational_fee(parking_cost: MinorUnits) -> (MinorUnits, MinorUnits) {
    let fee = apply_rate(parking_cost, OPERATIONAL_FEE_RATE);
    (fee, parking_cost + fee)
}

/// Ledger records created with a reservation
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub commission: Commission,
    pub fee: OperationalFee,
}

/// What cancellation did to the commission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// Unpaid commission removed
    Released,
    /// Nothing was recorded for the reservation
    NoCommission,
    /// Already paid out; left in place and flagged
    FlaggedAfterPayout,
}

/// Monthly commission summary
#[derive(Debug, Clone, Serialize)]
pub struct CommissionReport {
    pub period: PayoutPeriod,
    pub owner_id: Option<Uuid>,
    pub commissions: Vec<Commission>,
    pub total_parking_cost: MinorUnits,
    pub total_commission: MinorUnits,
    pub total_net: MinorUnits,
    pub unprocessed_count: usize,
}

impl CommissionReport {
    fn new(period: PayoutPeriod, owner_id: Option<Uuid>, commissions: Vec<Commission>) -> Self {
        Self {
            period,
            owner_id,
            total_parking_cost: commissions.iter().map(|c| c.parking_cost).sum(),
            total_commission: commissions.iter().map(|c| c.commission_amount).sum(),
            total_net: commissions.iter().map(|c| c.net_owner_amount).sum(),
            unprocessed_count: commissions.iter().filter(|c| !c.payout_processed).count(),
            commissions,
        }
    }
}

/// Ledger service
pub struct LedgerService {
    commissions: Arc<dyn CommissionRepository>,
    fees: Arc<dyn OperationalFeeRepository>,
    reconciliation: Arc<dyn ReconciliationRepository>,
}

impl LedgerService {
    pub fn new(
        commissions: Arc<dyn CommissionRepository>,
        fees: Arc<dyn OperationalFeeRepository>,
        reconciliation: Arc<dyn ReconciliationRepository>,
    ) -> Self {
        Self {
            commissions,
            fees,
            reconciliation,
        }
    }

    pub fn from_stores(stores: &Stores) -> Self {
        Self::new(
            stores.commissions.clone(),
            stores.fees.clone(),
            stores.reconciliation.clone(),
        )
    }

    /// Persist a reconciliation item; failures here are only logged
    async fn flag(&self, item: ReconciliationItem) {
        warn!(
            "Reconciliation item {} for {} {}",
            item.kind, item.entity_type, item.entity_id
        );
        if let Err(e) = self.reconciliation.record(&item).await {
            error!(
                "Failed to record reconciliation item {} for {}: {}",
                item.kind, item.entity_id, e
            );
        }
    }

    /// Create the commission and operational fee of a new reservation.
    ///
    /// Returns `None` when either write failed; the failure is flagged.
    #[instrument(skip(self, reservation, split), fields(reservation_id = %reservation.id))]
    pub async fn record_creation(
        &self,
        reservation: &Reservation,
        owner_id: Uuid,
        split: CommissionSplit,
    ) -> Option<LedgerEntry> {
        let now = Utc::now();
        let parking_cost = reservation.total_price;
        let commission = Commission {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            owner_id,
            parking_cost,
            commission_amount: split.commission,
            net_owner_amount: split.net_owner,
            rate: COMMISSION_RATE,
            breakdown: split.breakdown,
            payout_processed: false,
            payout_id: None,
            calculated_at: now,
        };
        let (fee_amount, total_charged) = operational_fee(parking_cost);
        let fee = OperationalFee {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            parking_cost,
            fee_amount,
            total_charged,
            rate: OPERATIONAL_FEE_RATE,
            created_at: now,
            updated_at: now,
        };

        let commission = match self.commissions.create(&commission).await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to create commission for {}: {}", reservation.id, e);
                self.flag(ReconciliationItem::for_reservation(
                    ReconciliationKind::LedgerCreateFailed,
                    reservation.id,
                    json!({ "record": "commission", "parking_cost": parking_cost, "error": e.to_string() }),
                ))
                .await;
                return None;
            }
        };

        let fee = match self.fees.create(&fee).await {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to create operational fee for {}: {}", reservation.id, e);
                self.flag(ReconciliationItem::for_reservation(
                    ReconciliationKind::LedgerCreateFailed,
                    reservation.id,
                    json!({ "record": "operational_fee", "parking_cost": parking_cost, "error": e.to_string() }),
                ))
                .await;
                return None;
            }
        };

        info!(
            "Ledger for {}: commission {} net {} fee {}",
            reservation.id, commission.commission_amount, commission.net_owner_amount, fee.fee_amount
        );
        Some(LedgerEntry { commission, fee })
    }

    /// Add an extension's parking cost and fee to the existing records.
    ///
    /// Only the delta is applied. Returns false when the records could not be
    /// updated; the failure is flagged.
    #[instrument(skip(self))]
    pub async fn apply_extension(&self, reservation_id: Uuid, quote: &ExtensionQuote) -> bool {
        match self.try_apply_extension(reservation_id, quote).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to apply extension to ledger of {}: {}", reservation_id, e);
                self.flag(ReconciliationItem::for_reservation(
                    ReconciliationKind::LedgerUpdateFailed,
                    reservation_id,
                    json!({
                        "parking_cost_delta": quote.parking_cost,
                        "fee_delta": quote.fee,
                        "error": e.to_string(),
                    }),
                ))
                .await;
                false
            }
        }
    }

    async fn try_apply_extension(&self, reservation_id: Uuid, quote: &ExtensionQuote) -> AppResult<()> {
        let mut commission = self
            .commissions
            .find_by_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::Internal("no commission recorded".to_string()))?;
        if commission.payout_processed {
            return Err(AppError::Internal(
                "commission already paid out".to_string(),
            ));
        }

        let delta_commission = apply_rate(quote.parking_cost, COMMISSION_RATE);
        commission.parking_cost += quote.parking_cost;
        commission.commission_amount += delta_commission;
        commission.net_owner_amount += quote.parking_cost - delta_commission;
        self.commissions.update(&commission).await?;

        let mut fee = self
            .fees
            .find_by_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::Internal("no operational fee recorded".to_string()))?;
        fee.parking_cost += quote.parking_cost;
        fee.fee_amount += quote.fee;
        fee.total_charged += quote.total;
        fee.updated_at = Utc::now();
        self.fees.update(&fee).await?;

        debug!(
            "Extension ledger delta for {}: +{} commission +{} fee",
            reservation_id, delta_commission, quote.fee
        );
        Ok(())
    }

    /// Record a confirmed extension payment whose new end was never stored
    pub async fn flag_unapplied_extension(
        &self,
        reservation_id: Uuid,
        payment_ref: &str,
        quote: &ExtensionQuote,
        cause: &str,
    ) {
        self.flag(ReconciliationItem::for_reservation(
            ReconciliationKind::PaidExtensionNotApplied,
            reservation_id,
            json!({
                "payment_ref": payment_ref,
                "minutes": quote.minutes,
                "parking_cost": quote.parking_cost,
                "fee": quote.fee,
                "total": quote.total,
                "error": cause,
            }),
        ))
        .await;
    }

    /// Release the commission once the status change has been committed.
    ///
    /// Any failure is flagged for reconciliation before being returned, so
    /// callers may report it without undoing the status change.
    #[instrument(skip(self))]
    pub async fn release_or_flag(&self, reservation_id: Uuid) -> AppResult<CancellationOutcome> {
        let result = self.release_for_cancellation(reservation_id).await;
        if let Err(e) = &result {
            error!("Failed to release commission of {}: {}", reservation_id, e);
            self.flag(ReconciliationItem::for_reservation(
                ReconciliationKind::LedgerReleaseFailed,
                reservation_id,
                json!({ "error": e.to_string() }),
            ))
            .await;
        }
        result
    }

    /// Drop the unpaid commission of a cancelled reservation.
    ///
    /// A commission already included in a payout is left untouched and flagged
    /// for manual clawback.
    #[instrument(skip(self))]
    pub async fn release_for_cancellation(&self, reservation_id: Uuid) -> AppResult<CancellationOutcome> {
        let Some(commission) = self.commissions.find_by_reservation(reservation_id).await? else {
            debug!("No commission to release for {}", reservation_id);
            return Ok(CancellationOutcome::NoCommission);
        };

        if commission.payout_processed {
            self.flag(ReconciliationItem::for_reservation(
                ReconciliationKind::CancelledAfterPayout,
                reservation_id,
                json!({
                    "commission_id": commission.id,
                    "payout_id": commission.payout_id,
                    "net_owner_amount": commission.net_owner_amount,
                }),
            ))
            .await;
            return Ok(CancellationOutcome::FlaggedAfterPayout);
        }

        if self.commissions.delete_by_reservation(reservation_id).await? {
            info!("Released commission of cancelled reservation {}", reservation_id);
            Ok(CancellationOutcome::Released)
        } else {
            // Claimed by a payout between the read and the delete
            self.flag(ReconciliationItem::for_reservation(
                ReconciliationKind::CancelledAfterPayout,
                reservation_id,
                json!({ "commission_id": commission.id }),
            ))
            .await;
            Ok(CancellationOutcome::FlaggedAfterPayout)
        }
    }

    /// Recompute the operational fee after a coupon so that the requester is
    /// charged `final_charged`. The parking-cost baseline is kept.
    #[instrument(skip(self))]
    pub async fn apply_coupon(
        &self,
        reservation_id: Uuid,
        final_charged: MinorUnits,
    ) -> AppResult<OperationalFee> {
        if final_charged < 0 {
            return Err(AppError::Validation(
                "final charged amount cannot be negative".to_string(),
            ));
        }
        let mut fee = self
            .fees
            .find_by_reservation(reservation_id)
            .await?
            .ok_or(AppError::ReservationNotFound(reservation_id))?;

        fee.fee_amount = final_charged - fee.parking_cost;
        fee.total_charged = final_charged;
        fee.updated_at = Utc::now();
        let fee = self.fees.update(&fee).await?;
        info!(
            "Coupon applied to {}: charged {} (fee {})",
            reservation_id, fee.total_charged, fee.fee_amount
        );
        Ok(fee)
    }

    /// Oldest unresolved reconciliation items, for operator review
    pub async fn open_reconciliation_items(&self, limit: i64) -> AppResult<Vec<ReconciliationItem>> {
        self.reconciliation.list_unresolved(limit).await
    }

    /// Close a reconciliation item once an operator has handled it
    #[instrument(skip(self))]
    pub async fn resolve_reconciliation_item(&self, item_id: Uuid) -> AppResult<()> {
        if self.reconciliation.resolve(item_id).await? {
            info!("Reconciliation item {} resolved", item_id);
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "reconciliation item {} is unknown or already resolved",
                item_id
            )))
        }
    }

    /// Commissions of one owner for a month
    #[instrument(skip(self))]
    pub async fn owner_commissions(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> AppResult<CommissionReport> {
        let period = PayoutPeriod::new(year, month)?;
        let commissions = self.commissions.list_by_owner_period(owner_id, period).await?;
        Ok(CommissionReport::new(period, Some(owner_id), commissions))
    }

    /// Every commission calculated in a month
    #[instrument(skip(self))]
    pub async fn all_commissions_for_month(&self, year: i32, month: u32) -> AppResult<CommissionReport> {
        let period = PayoutPeriod::new(year, month)?;
        let commissions = self.commissions.list_for_period(period).await?;
        Ok(CommissionReport::new(period, None, commissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryStore;
    use chrono::Datelike;
    use proptest::prelude::*;

    const HOUR: i64 = 3_600_000;

    fn reservation(price: MinorUnits) -> Reservation {
        Reservation {
            total_price: price,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_commission() {
        let split = commission_split(1400, None, 1000, 90 * 60_000);
        assert_eq!(split.commission, 210);
        assert_eq!(split.net_owner, 1190);
        assert!(split.breakdown.is_none());
    }

    #[test]
    fn test_tiered_commission_per_hour() {
        let table = PriceTable::new(vec![Some(1000), Some(800), Some(0)]);
        // 1h30 bills two tiers for commission purposes: 150 + 120
        let split = commission_split(1400, Some(&table), 0, 90 * 60_000);
        assert_eq!(split.commission, 270);
        assert_eq!(split.net_owner, 1130);
        assert_eq!(split.breakdown.as_ref().map(Vec::len), Some(2));

        // Free tiers contribute nothing
        let split = commission_split(1800, Some(&table), 0, 3 * HOUR);
        assert_eq!(split.commission, 270);
    }

    #[test]
    fn test_tiered_commission_capped_at_cost() {
        let table = PriceTable::new(vec![Some(100), Some(5000)]);
        let split = commission_split(101, Some(&table), 0, HOUR + 1000);
        assert_eq!(split.commission, 101);
        assert_eq!(split.net_owner, 0);
    }

    #[test]
    fn test_operational_fee() {
        assert_eq!(operational_fee(1400), (140, 1540));
        assert_eq!(operational_fee(333), (33, 366));
    }

    #[tokio::test]
    async fn test_record_creation_writes_both_records() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1400);
        let entry = ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1400, None, 0, HOUR))
            .await
            .unwrap();
        assert!(entry.commission.is_balanced());
        assert!(entry.fee.is_balanced());
        assert_eq!(entry.fee.total_charged, 1540);
        assert!(store.commission_for(r.id).is_some());
    }

    #[tokio::test]
    async fn test_record_creation_failure_is_flagged() {
        let store = InMemoryStore::new();
        store.fail_commission_writes(true);
        let ledger = store.ledger();
        let r = reservation(1400);
        let entry = ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1400, None, 0, HOUR))
            .await;
        assert!(entry.is_none());

        let items = store.reconciliation_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ReconciliationKind::LedgerCreateFailed);
        assert_eq!(items[0].entity_id, r.id);
    }

    #[tokio::test]
    async fn test_extension_adds_delta_only() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1400);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1400, None, 0, HOUR))
            .await
            .unwrap();

        let quote = ExtensionQuote {
            minutes: 30,
            parking_cost: 500,
            fee: 50,
            total: 550,
        };
        assert!(ledger.apply_extension(r.id, &quote).await);

        let c = store.commission_for(r.id).unwrap();
        assert_eq!(c.parking_cost, 1900);
        assert_eq!(c.commission_amount, 210 + 75);
        assert!(c.is_balanced());

        let f = store.fee_for(r.id).unwrap();
        assert_eq!(f.parking_cost, 1900);
        assert_eq!(f.fee_amount, 190);
        assert_eq!(f.total_charged, 2090);
    }

    #[tokio::test]
    async fn test_extension_keeps_calculation_month() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1400);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1400, None, 0, HOUR))
            .await
            .unwrap();
        let mut commission = store.commission_for(r.id).unwrap();
        let calculated_at = Utc::now() - chrono::Duration::days(40);
        commission.calculated_at = calculated_at;
        store.add_commission(commission);

        let quote = ExtensionQuote {
            minutes: 30,
            parking_cost: 500,
            fee: 50,
            total: 550,
        };
        assert!(ledger.apply_extension(r.id, &quote).await);
        let c = store.commission_for(r.id).unwrap();
        assert_eq!(c.calculated_at, calculated_at);
        assert_eq!(c.parking_cost, 1900);
    }

    #[tokio::test]
    async fn test_release_failure_is_flagged() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1000);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1000, None, 0, HOUR))
            .await
            .unwrap();
        store.fail_commission_writes(true);

        assert!(ledger.release_or_flag(r.id).await.is_err());
        let items = store.reconciliation_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ReconciliationKind::LedgerReleaseFailed);
        assert_eq!(items[0].entity_id, r.id);
    }

    #[tokio::test]
    async fn test_reconciliation_queue() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let quote = ExtensionQuote {
            minutes: 30,
            parking_cost: 500,
            fee: 50,
            total: 550,
        };
        let reservation_id = Uuid::new_v4();
        ledger
            .flag_unapplied_extension(reservation_id, "pay-7", &quote, "simulated")
            .await;
        assert!(!ledger.apply_extension(Uuid::new_v4(), &quote).await);

        let open = ledger.open_reconciliation_items(10).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].kind, ReconciliationKind::PaidExtensionNotApplied);
        let details = open[0].details.as_ref().unwrap();
        assert_eq!(details["payment_ref"], "pay-7");
        assert_eq!(details["total"], 550);

        ledger.resolve_reconciliation_item(open[0].id).await.unwrap();
        assert_eq!(ledger.open_reconciliation_items(10).await.unwrap().len(), 1);
        assert!(ledger.resolve_reconciliation_item(open[0].id).await.is_err());
        assert_eq!(ledger.open_reconciliation_items(0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_extension_without_commission_is_flagged() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let quote = ExtensionQuote {
            minutes: 30,
            parking_cost: 500,
            fee: 50,
            total: 550,
        };
        assert!(!ledger.apply_extension(Uuid::new_v4(), &quote).await);
        assert_eq!(
            store.reconciliation_items()[0].kind,
            ReconciliationKind::LedgerUpdateFailed
        );
    }

    #[tokio::test]
    async fn test_cancel_unprocessed_deletes_commission() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1000);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1000, None, 0, HOUR))
            .await
            .unwrap();

        let outcome = ledger.release_for_cancellation(r.id).await.unwrap();
        assert_eq!(outcome, CancellationOutcome::Released);
        assert!(store.commission_for(r.id).is_none());
        assert!(store.reconciliation_items().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_payout_keeps_and_flags() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1000);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1000, None, 0, HOUR))
            .await
            .unwrap();
        store.mark_commission_processed(r.id, Uuid::new_v4());

        let outcome = ledger.release_for_cancellation(r.id).await.unwrap();
        assert_eq!(outcome, CancellationOutcome::FlaggedAfterPayout);
        assert!(store.commission_for(r.id).is_some());
        let items = store.reconciliation_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ReconciliationKind::CancelledAfterPayout);
    }

    #[tokio::test]
    async fn test_coupon_keeps_parking_cost() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let r = reservation(1400);
        ledger
            .record_creation(&r, Uuid::new_v4(), commission_split(1400, None, 0, HOUR))
            .await
            .unwrap();

        let fee = ledger.apply_coupon(r.id, 1200).await.unwrap();
        assert_eq!(fee.parking_cost, 1400);
        assert_eq!(fee.fee_amount, -200);
        assert_eq!(fee.total_charged, 1200);
        assert_eq!(store.commission_for(r.id).unwrap().commission_amount, 210);

        assert!(ledger.apply_coupon(Uuid::new_v4(), 100).await.is_err());
        assert!(ledger.apply_coupon(r.id, -1).await.is_err());
    }

    #[tokio::test]
    async fn test_monthly_reports() {
        let store = InMemoryStore::new();
        let ledger = store.ledger();
        let owner = Uuid::new_v4();
        for price in [1000, 2000] {
            ledger
                .record_creation(&reservation(price), owner, commission_split(price, None, 0, HOUR))
                .await
                .unwrap();
        }
        ledger
            .record_creation(&reservation(500), Uuid::new_v4(), commission_split(500, None, 0, HOUR))
            .await
            .unwrap();

        let now = Utc::now();
        let report = ledger.owner_commissions(owner, now.year(), now.month()).await.unwrap();
        assert_eq!(report.commissions.len(), 2);
        assert_eq!(report.total_parking_cost, 3000);
        assert_eq!(report.total_commission, 450);
        assert_eq!(report.total_net, 2550);

        let all = ledger.all_commissions_for_month(now.year(), now.month()).await.unwrap();
        assert_eq!(all.commissions.len(), 3);
        assert_eq!(all.unprocessed_count, 3);
        assert!(ledger.all_commissions_for_month(now.year(), 13).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_commission_balances(
            cost in 0i64..1_000_000,
            t1 in proptest::option::of(0i64..10_000),
            t2 in proptest::option::of(0i64..10_000),
            duration_ms in 0i64..(24 * HOUR),
            use_table in any::<bool>(),
        ) {
            let table = PriceTable::new(vec![t1, t2]);
            let split = commission_split(cost, use_table.then_some(&table), 1000, duration_ms);
            prop_assert_eq!(split.commission + split.net_owner, cost);
            prop_assert!(split.commission >= 0);
            prop_assert!(split.commission <= cost);
            if !use_table {
                prop_assert_eq!(split.commission, apply_rate(cost, COMMISSION_RATE));
            }
            let (fee, total) = operational_fee(cost);
            prop_assert_eq!(fee + cost, total);
        }
    }
}

//! Extension engine
//!
//! Evaluates and executes a fixed-increment extension of a confirmed
//! reservation's end time. Eligibility is checked in a fixed order and each
//! failure maps to a typed refusal; execution re-runs the check under the
//! resource lock, requires a confirmed payment and then applies the new end,
//! the new parking-cost-only price and the ledger deltas.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use park_core::{
    config::EngineConfig,
    models::{LimitedBy, ParkingResource, Reservation, ReservationStatus, TimeWindow, TimelinePhase},
    traits::PaymentConfirmation,
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::availability::schedule_permits;
use crate::ledger::LedgerService;
use crate::locks::ResourceLocks;
use crate::pricing::{ExtensionQuote, PricingEngine};
use crate::Stores;

/// Why an extension is refused
#[derive(Debug, Clone)]
pub enum ExtensionRefusal {
    NotFound,
    Unauthorized,
    NotActive,
    TooCloseToEnd { remaining_minutes: i64 },
    ResourceOccupied { conflicting: Box<Reservation> },
    OwnerUnavailable { message: String },
}

impl ExtensionRefusal {
    pub fn code(&self) -> &'static str {
        match self {
            ExtensionRefusal::NotFound => "NOT_FOUND",
            ExtensionRefusal::Unauthorized => "UNAUTHORIZED",
            ExtensionRefusal::NotActive => "NOT_ACTIVE",
            ExtensionRefusal::TooCloseToEnd { .. } => "TOO_CLOSE_TO_END",
            ExtensionRefusal::ResourceOccupied { .. } => "RESOURCE_OCCUPIED",
            ExtensionRefusal::OwnerUnavailable { .. } => "OWNER_UNAVAILABLE",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ExtensionRefusal::NotFound => "reservation not found".to_string(),
            ExtensionRefusal::Unauthorized => "reservation belongs to another requester".to_string(),
            ExtensionRefusal::NotActive => {
                "only confirmed, active or upcoming reservations can be extended".to_string()
            }
            ExtensionRefusal::TooCloseToEnd { remaining_minutes } => {
                format!("only {} minutes remaining", remaining_minutes)
            }
            ExtensionRefusal::ResourceOccupied { conflicting } => format!(
                "parking is booked from {}",
                conflicting.start_time.format("%Y-%m-%d %H:%M UTC")
            ),
            ExtensionRefusal::OwnerUnavailable { message } => message.clone(),
        }
    }

    pub fn into_error(self) -> AppError {
        AppError::ExtensionRefused {
            refusal_code: self.code(),
            message: self.message(),
        }
    }
}

/// Eligibility answer returned to the requester
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionEligibility {
    pub reservation_id: Uuid,
    pub can_extend: bool,
    /// Refusal code, when refused
    pub reason_code: Option<&'static str>,
    pub message: Option<String>,
    /// Conflicting reservation for `RESOURCE_OCCUPIED`
    pub conflicting_reservation_id: Option<Uuid>,
    pub current_end: Option<DateTime<Utc>>,
    pub new_end: Option<DateTime<Utc>>,
    pub remaining_minutes: Option<i64>,
    pub quote: Option<ExtensionQuote>,
    #[serde(skip)]
    pub refusal: Option<ExtensionRefusal>,
}

impl ExtensionEligibility {
    fn refused(reservation_id: Uuid, refusal: ExtensionRefusal) -> Self {
        let conflicting_reservation_id = match &refusal {
            ExtensionRefusal::ResourceOccupied { conflicting } => Some(conflicting.id),
            _ => None,
        };
        Self {
            reservation_id,
            can_extend: false,
            reason_code: Some(refusal.code()),
            message: Some(refusal.message()),
            conflicting_reservation_id,
            current_end: None,
            new_end: None,
            remaining_minutes: None,
            quote: None,
            refusal: Some(refusal),
        }
    }
}

/// Extension that passed every check
#[derive(Debug, Clone)]
struct Candidate {
    reservation: Reservation,
    tail: TimeWindow,
    quote: ExtensionQuote,
}

/// Extension engine
pub struct ExtensionEngine {
    stores: Stores,
    ledger: Arc<LedgerService>,
    payments: Arc<dyn PaymentConfirmation>,
    locks: Arc<ResourceLocks>,
    pricing: PricingEngine,
    config: EngineConfig,
}

impl ExtensionEngine {
    pub fn new(
        stores: Stores,
        ledger: Arc<LedgerService>,
        payments: Arc<dyn PaymentConfirmation>,
        locks: Arc<ResourceLocks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            stores,
            ledger,
            payments,
            locks,
            pricing: PricingEngine::new(config.pricing_method),
            config,
        }
    }

    fn increment(&self) -> Duration {
        Duration::minutes(self.config.extension_minutes)
    }

    fn time_zone_of(&self, resource: &ParkingResource) -> Tz {
        resource.time_zone.unwrap_or(self.config.time_zone)
    }

    /// Run the eligibility checks in order, first failure wins
    async fn evaluate(
        &self,
        reservation_id: Uuid,
        requester_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Result<Candidate, ExtensionRefusal>> {
        let Some(reservation) = self.stores.reservations.find_by_id(reservation_id).await? else {
            return Ok(Err(ExtensionRefusal::NotFound));
        };
        if reservation.requester_id != requester_id {
            return Ok(Err(ExtensionRefusal::Unauthorized));
        }

        let phase = reservation.phase(now);
        if reservation.status != ReservationStatus::Confirmed || phase == TimelinePhase::Ended {
            return Ok(Err(ExtensionRefusal::NotActive));
        }

        let remaining = reservation.remaining(now);
        if phase == TimelinePhase::Active
            && remaining < Duration::minutes(self.config.min_remaining_for_extension_minutes)
        {
            return Ok(Err(ExtensionRefusal::TooCloseToEnd {
                remaining_minutes: remaining.num_minutes(),
            }));
        }

        let tail = TimeWindow::new(reservation.end_time, reservation.end_time + self.increment());
        let occupied = self
            .stores
            .reservations
            .find_overlapping(reservation.resource_id, tail, Some(reservation.id))
            .await?;
        if let Some(conflicting) = occupied.into_iter().min_by_key(|r| r.start_time) {
            return Ok(Err(ExtensionRefusal::ResourceOccupied {
                conflicting: Box::new(conflicting),
            }));
        }

        let Some(resource) = self.stores.resources.find_by_id(reservation.resource_id).await? else {
            return Ok(Err(ExtensionRefusal::OwnerUnavailable {
                message: "parking resource not found".to_string(),
            }));
        };
        if let Some(reason) = resource.unavailable_reason() {
            return Ok(Err(ExtensionRefusal::OwnerUnavailable {
                message: reason.to_string(),
            }));
        }
        let tz = self.time_zone_of(&resource);
        let lookahead = Duration::hours(self.config.unrestricted_lookahead_hours);
        if let Err(bound) = schedule_permits(resource.schedule.as_ref(), tz, tail, lookahead) {
            let local = bound.until.with_timezone(&tz);
            let message = match bound.limited_by {
                LimitedBy::Schedule => format!("owner schedule ends at {}", local.format("%H:%M")),
                _ => format!("bookable until {} at most", local.format("%d/%m %H:%M")),
            };
            return Ok(Err(ExtensionRefusal::OwnerUnavailable { message }));
        }

        let quote = self
            .pricing
            .extension_quote(&resource, self.config.extension_minutes);
        Ok(Ok(Candidate {
            reservation,
            tail,
            quote,
        }))
    }

    /// Whether `requester_id` may extend `reservation_id` right now
    #[instrument(skip(self))]
    pub async fn check_eligibility(
        &self,
        reservation_id: Uuid,
        requester_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ExtensionEligibility> {
        match self.evaluate(reservation_id, requester_id, now).await? {
            Ok(candidate) => {
                debug!(
                    "Reservation {} can extend to {} for {}",
                    reservation_id, candidate.tail.end, candidate.quote.total
                );
                Ok(ExtensionEligibility {
                    reservation_id,
                    can_extend: true,
                    reason_code: None,
                    message: None,
                    conflicting_reservation_id: None,
                    current_end: Some(candidate.tail.start),
                    new_end: Some(candidate.tail.end),
                    remaining_minutes: Some(candidate.reservation.remaining(now).num_minutes()),
                    quote: Some(candidate.quote),
                    refusal: None,
                })
            }
            Err(refusal) => {
                debug!("Extension of {} refused: {}", reservation_id, refusal.code());
                Ok(ExtensionEligibility::refused(reservation_id, refusal))
            }
        }
    }

    /// Extend `reservation_id` once `payment_ref` is confirmed for the quoted total.
    ///
    /// The window update is the commit point; ledger failures after it are
    /// flagged for reconciliation and do not fail the extension. A confirmed
    /// payment whose window update fails is flagged as well.
    #[instrument(skip(self, payment_ref))]
    pub async fn execute(
        &self,
        reservation_id: Uuid,
        requester_id: Uuid,
        payment_ref: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let resource_id = self
            .stores
            .reservations
            .find_by_id(reservation_id)
            .await?
            .map(|r| r.resource_id)
            .ok_or_else(|| ExtensionRefusal::NotFound.into_error())?;
        let _guard = self.locks.lock(resource_id).await;

        let candidate = self
            .evaluate(reservation_id, requester_id, now)
            .await?
            .map_err(|refusal| {
                warn!("Extension of {} refused: {}", reservation_id, refusal.code());
                refusal.into_error()
            })?;

        let confirmed = self
            .payments
            .is_confirmed(reservation_id, payment_ref, candidate.quote.total)
            .await?;
        if !confirmed {
            warn!("Payment {} not confirmed for {}", payment_ref, reservation_id);
            return Err(AppError::PaymentNotConfirmed(payment_ref.to_string()));
        }

        let mut extended = candidate.reservation.clone();
        extended.end_time = candidate.tail.end;
        extended.total_price = candidate.reservation.total_price + candidate.quote.parking_cost;
        extended.updated_at = Utc::now();

        let extended = match self.stores.reservations.extend_if_free(&extended).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(conflicting)) => {
                error!(
                    "Paid extension of {} lost its window to reservation {}",
                    reservation_id, conflicting.id
                );
                self.ledger
                    .flag_unapplied_extension(
                        reservation_id,
                        payment_ref,
                        &candidate.quote,
                        &format!("window taken by reservation {}", conflicting.id),
                    )
                    .await;
                return Err(ExtensionRefusal::ResourceOccupied {
                    conflicting: Box::new(conflicting),
                }
                .into_error());
            }
            Err(e) => {
                error!("Failed to store paid extension of {}: {}", reservation_id, e);
                self.ledger
                    .flag_unapplied_extension(reservation_id, payment_ref, &candidate.quote, &e.to_string())
                    .await;
                return Err(e);
            }
        };

        self.ledger
            .apply_extension(reservation_id, &candidate.quote)
            .await;

        info!(
            "Extended reservation {} to {} (+{} parking, {} charged)",
            reservation_id, extended.end_time, candidate.quote.parking_cost, candidate.quote.total
        );
        Ok(extended)
    }
}

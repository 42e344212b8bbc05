//! Business logic services for ParkShare
//!
//! This crate contains the engine that decides whether a parking reservation
//! is legal, what it costs, how the money is split, and how it may be
//! extended, plus the periodic sweeps that expire stale approvals and batch
//! monthly owner payouts.
//!
//! # Architecture
//!
//! Services depend only on the repository traits from park-core:
//! - Storage is injected as `Arc<dyn ...>` through [`Stores`]
//! - Pure calculations (schedule scan, pricing, commission split) are free
//!   functions that the services compose
//! - All entry points are instrumented with tracing
//!
//! # Services
//!
//! - `AvailabilityCalculator` - availability window from schedule and bookings
//! - `ConflictDetector` - overlap checks per resource and per vehicle
//! - `PricingEngine` - legacy and proportional tiered pricing
//! - `LedgerService` - commission and operational fee records
//! - `ExtensionEngine` - fixed-increment extension of a reservation
//! - `ReservationService` - validation, creation and status changes
//! - `ScheduleMigrationService` - 3h/4h schedule conversion with review flags
//! - `SweepService` - approval expiry and monthly payouts

pub mod availability;
pub mod conflict;
pub mod extension;
pub mod ledger;
pub mod locks;
pub mod pricing;
pub mod reservation_service;
pub mod schedule_migration;
pub mod sweeps;

#[cfg(test)]
pub(crate) mod test_support;

pub use availability::AvailabilityCalculator;
pub use conflict::ConflictDetector;
pub use extension::{ExtensionEligibility, ExtensionEngine, ExtensionRefusal};
pub use ledger::LedgerService;
pub use locks::{LocalSweepGuard, ResourceLocks};
pub use pricing::{PriceBreakdown, PricingEngine};
pub use reservation_service::ReservationService;
pub use schedule_migration::ScheduleMigrationService;
pub use sweeps::SweepService;

use park_core::traits::{
    CommissionRepository, OperationalFeeRepository, PayoutRepository, ReconciliationRepository,
    ReservationRepository, ResourceRepository,
};
use std::sync::Arc;

/// Storage handles shared by every service
#[derive(Clone)]
pub struct Stores {
    pub resources: Arc<dyn ResourceRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub commissions: Arc<dyn CommissionRepository>,
    pub fees: Arc<dyn OperationalFeeRepository>,
    pub payouts: Arc<dyn PayoutRepository>,
    pub reconciliation: Arc<dyn ReconciliationRepository>,
}

/// Business logic constants
pub mod constants {
    /// Days scanned forward by the availability calculator
    pub const SCAN_DAYS: i64 = 7;

    /// Milliseconds per billed hour
    pub const MS_PER_HOUR: i64 = 3_600_000;

    /// Per-resource lock table size that triggers pruning of idle entries
    pub const RESOURCE_LOCK_PRUNE_THRESHOLD: usize = 1024;

    /// Sweep job names, also used as leader lock keys
    pub const EXPIRY_SWEEP_JOB: &str = "expiry";
    pub const PAYOUT_SWEEP_JOB: &str = "payout";
}

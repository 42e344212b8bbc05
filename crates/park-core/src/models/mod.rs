//! Domain models for ParkShare
//!
//! This module contains all the core domain models used throughout the engine.

pub mod availability;
pub mod commission;
pub mod payout;
pub mod reconciliation;
pub mod reservation;
pub mod resource;
pub mod schedule;

pub use availability::{AvailabilityWindow, LimitedBy, WindowValidation};
pub use commission::{
    Commission, CommissionLine, OperationalFee, COMMISSION_RATE, OPERATIONAL_FEE_RATE,
};
pub use payout::{OwnerPayout, PayoutPeriod, PayoutStatus};
pub use reconciliation::{ReconciliationItem, ReconciliationKind};
pub use reservation::{
    normalize_plate, CreateReservationRequest, Reservation, ReservationStatus, TimeWindow,
    TimelinePhase,
};
pub use resource::{hour_price, ParkingResource, PriceTable};
pub use schedule::{
    block_start, detect_granularity, migrate, validate_schedule, DayKey, DetectedGranularity,
    Granularity, ScheduleValidation, WeeklySchedule,
};

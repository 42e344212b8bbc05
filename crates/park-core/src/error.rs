//! Unified error handling for ParkShare
//!
//! This module provides a single error type that covers every failure the
//! engine can report. Each variant maps to a stable reason code so that the
//! calling layer can surface it without parsing messages.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Main application error type
///
/// All errors in the engine should be converted to this type.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Validation Errors ====================
    #[error("Invalid reservation window: {0}")]
    InvalidWindow(String),

    #[error("Duration too short: minimum is {min_minutes} minutes")]
    DurationTooShort { min_minutes: i64 },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Resource Errors ====================
    #[error("Parking resource not found: {0}")]
    ResourceNotFound(Uuid),

    #[error("Parking resource is inactive: {0}")]
    ResourceInactive(Uuid),

    #[error("Owner of parking resource {0} is blocked")]
    OwnerBlocked(Uuid),

    // ==================== Conflict Errors ====================
    #[error("Time window overlaps reservation {reservation_id}")]
    BookingConflict { reservation_id: Uuid },

    #[error("Vehicle already holds overlapping reservations: {reservation_ids:?}")]
    VehicleConflict { reservation_ids: Vec<Uuid> },

    #[error("Reservation window too long: bookable until {max_end} at most")]
    WindowTooLong { max_end: DateTime<Utc> },

    #[error("Owner schedule does not allow this window: {message}")]
    ScheduleRefused {
        message: String,
        suggested_end: Option<DateTime<Utc>>,
    },

    // ==================== Lifecycle Errors ====================
    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// `refusal_code` is the upper-case eligibility code shown to the requester
    #[error("Extension refused ({refusal_code}): {message}")]
    ExtensionRefused {
        refusal_code: &'static str,
        message: String,
    },

    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    #[error("Payout not found: {0}")]
    PayoutNotFound(Uuid),

    // ==================== Sweep Errors ====================
    #[error("Sweep already running: {0}")]
    SweepBusy(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the reason code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::InvalidWindow(_) => "invalid_window",
            AppError::DurationTooShort { .. } => "duration_too_short",
            AppError::WindowTooLong { .. } => "window_too_long",
            AppError::InvalidSchedule(_) => "invalid_schedule",
            AppError::Validation(_) => "validation_error",
            AppError::ResourceNotFound(_) => "resource_not_found",
            AppError::ResourceInactive(_) => "resource_inactive",
            AppError::OwnerBlocked(_) => "owner_blocked",
            AppError::BookingConflict { .. } => "booking_conflict",
            AppError::VehicleConflict { .. } => "vehicle_conflict",
            AppError::ScheduleRefused { .. } => "schedule_refused",
            AppError::ReservationNotFound(_) => "reservation_not_found",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::ExtensionRefused { .. } => "extension_refused",
            AppError::PaymentNotConfirmed(_) => "payment_not_confirmed",
            AppError::PayoutNotFound(_) => "payout_not_found",
            AppError::SweepBusy(_) => "sweep_busy",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Validation errors are reported to the caller and never retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidWindow(_)
                | AppError::DurationTooShort { .. }
                | AppError::WindowTooLong { .. }
                | AppError::InvalidSchedule(_)
                | AppError::Validation(_)
                | AppError::ResourceInactive(_)
                | AppError::OwnerBlocked(_)
        )
    }

    /// Conflict errors carry the conflicting entity when one is known
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AppError::BookingConflict { .. }
                | AppError::VehicleConflict { .. }
                | AppError::ScheduleRefused { .. }
        )
    }

    /// Storage and cache failures that a sweep may retry on its next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Transaction(_)
                | AppError::Cache(_)
                | AppError::CacheConnection(_)
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::ResourceNotFound(Uuid::nil()).error_code(),
            "resource_not_found"
        );
        assert_eq!(
            AppError::DurationTooShort { min_minutes: 15 }.error_code(),
            "duration_too_short"
        );
        let refused = AppError::ExtensionRefused {
            refusal_code: "TOO_CLOSE_TO_END",
            message: "8 minutes remaining".to_string(),
        };
        assert_eq!(refused.error_code(), "extension_refused");
        assert!(refused.to_string().contains("TOO_CLOSE_TO_END"));
    }

    #[test]
    fn test_error_codes_are_snake_case() {
        let errors = [
            AppError::ExtensionRefused {
                refusal_code: "RESOURCE_OCCUPIED",
                message: String::new(),
            },
            AppError::WindowTooLong {
                max_end: Utc::now(),
            },
            AppError::PaymentNotConfirmed("pay-1".into()),
        ];
        for e in &errors {
            let code = e.error_code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{}", code);
        }
        assert!(errors[1].is_validation());
    }

    #[test]
    fn test_error_taxonomy() {
        assert!(AppError::InvalidWindow("end before start".into()).is_validation());
        assert!(AppError::BookingConflict {
            reservation_id: Uuid::nil()
        }
        .is_conflict());
        assert!(AppError::Database("timeout".into()).is_transient());
        assert!(!AppError::Unauthorized("not owner".into()).is_transient());
    }
}

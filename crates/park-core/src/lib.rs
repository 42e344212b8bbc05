//! ParkShare Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the ParkShare reservation engine. It includes:
//!
//! - Domain models (ParkingResource, WeeklySchedule, Reservation, Commission, etc.)
//! - Integer minor-unit money helpers
//! - Repository and collaborator traits implemented by the storage layer
//! - Unified error handling with stable reason codes
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod money;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

//! ParkShare Database Layer
//!
//! This crate provides PostgreSQL access and repository implementations
//! for the ParkShare engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for every ledger entity
//! - Per-resource advisory locking around reservation inserts

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use park_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};

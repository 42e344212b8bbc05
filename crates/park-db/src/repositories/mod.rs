//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in park-core, using sqlx for PostgreSQL access.

pub mod commission_repo;
pub mod payout_repo;
pub mod reservation_repo;
pub mod resource_repo;

pub use commission_repo::{PgCommissionRepository, PgOperationalFeeRepository};
pub use payout_repo::{PgPayoutRepository, PgReconciliationRepository};
pub use reservation_repo::PgReservationRepository;
pub use resource_repo::PgResourceRepository;

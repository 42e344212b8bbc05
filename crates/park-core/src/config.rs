//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::debug;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sweeps: SweepConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Redis configuration (leader lock for the sweeps)
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Billing method used by the pricing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    /// Whole hours rounded up, each priced at its tier
    Legacy,
    /// Whole hours at their tier plus a fractional trailing hour
    #[default]
    Proportional,
}

/// Reservation engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// IANA time zone used for schedule evaluation
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,

    /// Active billing method
    #[serde(default)]
    pub pricing_method: PricingMethod,

    /// Skip the owner approval step and confirm immediately
    #[serde(default = "default_true")]
    pub auto_confirm: bool,

    /// How long an owner has to approve a pending reservation
    #[serde(default = "default_approval_ttl")]
    pub approval_ttl_minutes: i64,

    /// Look-ahead cap for resources without a schedule
    #[serde(default = "default_lookahead")]
    pub unrestricted_lookahead_hours: i64,

    /// Shortest bookable window
    #[serde(default = "default_min_booking")]
    pub min_booking_minutes: i64,

    /// Fixed extension increment
    #[serde(default = "default_extension")]
    pub extension_minutes: i64,

    /// An active reservation must have at least this much time left to extend
    #[serde(default = "default_min_remaining")]
    pub min_remaining_for_extension_minutes: i64,
}

fn default_time_zone() -> Tz {
    Tz::Asia__Jerusalem
}

fn default_approval_ttl() -> i64 {
    60
}

fn default_lookahead() -> i64 {
    12
}

fn default_min_booking() -> i64 {
    15
}

fn default_extension() -> i64 {
    30
}

fn default_min_remaining() -> i64 {
    10
}

/// Background sweep configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    /// Run the sweeps in this process
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pending-approval expiry sweep period in seconds
    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    /// Monthly payout sweep check period in seconds
    #[serde(default = "default_payout_interval")]
    pub payout_interval_secs: u64,

    /// Leader lock lease in seconds
    #[serde(default = "default_leader_ttl")]
    pub leader_lock_ttl_secs: u64,
}

fn default_expiry_interval() -> u64 {
    60
}

fn default_payout_interval() -> u64 {
    3600
}

fn default_leader_ttl() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        debug!("Loading configuration for run mode {}", run_mode);

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("engine.time_zone", "Asia/Jerusalem")?
            .set_default("engine.pricing_method", "proportional")?
            .set_default("engine.auto_confirm", true)?
            .set_default("engine.approval_ttl_minutes", 60)?
            .set_default("sweeps.expiry_interval_secs", 60)?
            .set_default("sweeps.payout_interval_secs", 3600)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with PARKSHARE_ prefix
            .add_source(
                Environment::with_prefix("PARKSHARE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PARKSHARE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            pricing_method: PricingMethod::default(),
            auto_confirm: true,
            approval_ttl_minutes: default_approval_ttl(),
            unrestricted_lookahead_hours: default_lookahead(),
            min_booking_minutes: default_min_booking(),
            extension_minutes: default_extension(),
            min_remaining_for_extension_minutes: default_min_remaining(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry_interval_secs: default_expiry_interval(),
            payout_interval_secs: default_payout_interval(),
            leader_lock_ttl_secs: default_leader_ttl(),
        }
    }
}

//! ParkShare engine daemon
//!
//! Connects the storage layer and runs the periodic sweeps: expiry of stale
//! owner approvals and the monthly owner payout batch.

use anyhow::Context;
use park_cache::{RedisCache, RedisLeaderLock};
use park_core::{traits::SweepLock, AppConfig};
use park_db::{
    create_pool, run_migrations, PgCommissionRepository, PgOperationalFeeRepository,
    PgPayoutRepository, PgReconciliationRepository, PgReservationRepository,
    PgResourceRepository,
};
use park_services::{LocalSweepGuard, Stores, SweepService};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parkshare={0},park_services={0},park_db={0},park_cache={0},sqlx=warn",
            log_level
        ))
    });

    let json = env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting ParkShare engine v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(
        "Engine: time zone {}, pricing {:?}, auto-confirm {}",
        config.engine.time_zone, config.engine.pricing_method, config.engine.auto_confirm
    );

    info!("Connecting to database...");
    let pool = create_pool(&config.database).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let stores = Stores {
        resources: Arc::new(PgResourceRepository::new(pool.clone())),
        reservations: Arc::new(PgReservationRepository::new(pool.clone())),
        commissions: Arc::new(PgCommissionRepository::new(pool.clone())),
        fees: Arc::new(PgOperationalFeeRepository::new(pool.clone())),
        payouts: Arc::new(PgPayoutRepository::new(pool.clone())),
        reconciliation: Arc::new(PgReconciliationRepository::new(pool.clone())),
    };

    let sweep_lock: Arc<dyn SweepLock> = match &config.redis {
        Some(redis) => {
            let cache = RedisCache::new(&redis.url).await?;
            cache.ping().await.context("redis did not answer PING")?;
            info!("Sweeps coordinated through Redis leader lock");
            Arc::new(RedisLeaderLock::new(cache, config.sweeps.leader_lock_ttl_secs))
        }
        None => {
            warn!("Redis not configured, sweeps only guarded within this process");
            Arc::new(LocalSweepGuard::new())
        }
    };

    let handles = if config.sweeps.enabled {
        let sweeps = Arc::new(SweepService::new(stores, sweep_lock, config.sweeps.clone()));
        sweeps.spawn()
    } else {
        warn!("Sweeps disabled by configuration");
        Vec::new()
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");

    for handle in handles {
        handle.abort();
    }
    pool.close().await;

    Ok(())
}

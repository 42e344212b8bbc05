//! Commission and operational fee repository implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_core::{
    models::{Commission, CommissionLine, OperationalFee, PayoutPeriod},
    traits::{CommissionRepository, OperationalFeeRepository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const COMMISSION_COLUMNS: &str = r#"
    id, reservation_id, owner_id, parking_cost, commission_amount,
    net_owner_amount, rate, breakdown, payout_processed, payout_id, calculated_at
"#;

/// PostgreSQL implementation of CommissionRepository
pub struct PgCommissionRepository {
    pool: PgPool,
}

impl PgCommissionRepository {
    /// Create a new commission repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_in_period(
        &self,
        period: PayoutPeriod,
        owner_id: Option<Uuid>,
        unprocessed_only: bool,
    ) -> AppResult<Vec<Commission>> {
        let (start, end) = period.bounds();

        let rows = sqlx::query_as::<sqlx::Postgres, CommissionRow>(&format!(
            r#"
            SELECT {}
            FROM commissions
            WHERE calculated_at >= $1
              AND calculated_at < $2
              AND ($3::uuid IS NULL OR owner_id = $3)
              AND (NOT $4 OR payout_processed = FALSE)
            ORDER BY owner_id, calculated_at
            "#,
            COMMISSION_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .bind(owner_id)
        .bind(unprocessed_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing commissions for {}: {}", period, e);
            AppError::Database(format!("Failed to list commissions: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl CommissionRepository for PgCommissionRepository {
    #[instrument(skip(self))]
    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<Commission>> {
        debug!("Finding commission of reservation {}", reservation_id);

        let row = sqlx::query_as::<sqlx::Postgres, CommissionRow>(&format!(
            "SELECT {} FROM commissions WHERE reservation_id = $1",
            COMMISSION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding commission: {}", e);
            AppError::Database(format!("Failed to find commission: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, commission), fields(reservation_id = %commission.reservation_id))]
    async fn create(&self, commission: &Commission) -> AppResult<Commission> {
        let row = sqlx::query_as::<sqlx::Postgres, CommissionRow>(&format!(
            r#"
            INSERT INTO commissions (
                id, reservation_id, owner_id, parking_cost, commission_amount,
                net_owner_amount, rate, breakdown, payout_processed, payout_id, calculated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        ))
        .bind(commission.id)
        .bind(commission.reservation_id)
        .bind(commission.owner_id)
        .bind(commission.parking_cost)
        .bind(commission.commission_amount)
        .bind(commission.net_owner_amount)
        .bind(commission.rate)
        .bind(commission.breakdown.clone().map(Json))
        .bind(commission.payout_processed)
        .bind(commission.payout_id)
        .bind(commission.calculated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating commission: {}", e);
            AppError::Database(format!("Failed to create commission: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, commission), fields(reservation_id = %commission.reservation_id))]
    async fn update(&self, commission: &Commission) -> AppResult<Commission> {
        let row = sqlx::query_as::<sqlx::Postgres, CommissionRow>(&format!(
            r#"
            UPDATE commissions
            SET parking_cost = $2,
                commission_amount = $3,
                net_owner_amount = $4,
                breakdown = $5,
                calculated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        ))
        .bind(commission.id)
        .bind(commission.parking_cost)
        .bind(commission.commission_amount)
        .bind(commission.net_owner_amount)
        .bind(commission.breakdown.clone().map(Json))
        .bind(commission.calculated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating commission {}: {}", commission.id, e);
            AppError::Database(format!("Failed to update commission: {}", e))
        })?;

        row.map(Into::into).ok_or_else(|| {
            AppError::Database(format!("Commission {} disappeared", commission.id))
        })
    }

    #[instrument(skip(self))]
    async fn delete_by_reservation(&self, reservation_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM commissions WHERE reservation_id = $1 AND payout_processed = FALSE",
        )
        .bind(reservation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error deleting commission: {}", e);
            AppError::Database(format!("Failed to delete commission: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_unprocessed_in_period(&self, period: PayoutPeriod) -> AppResult<Vec<Commission>> {
        self.fetch_in_period(period, None, true).await
    }

    #[instrument(skip(self))]
    async fn list_by_owner_period(
        &self,
        owner_id: Uuid,
        period: PayoutPeriod,
    ) -> AppResult<Vec<Commission>> {
        self.fetch_in_period(period, Some(owner_id), false).await
    }

    #[instrument(skip(self))]
    async fn list_for_period(&self, period: PayoutPeriod) -> AppResult<Vec<Commission>> {
        self.fetch_in_period(period, None, false).await
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CommissionRow {
    id: Uuid,
    reservation_id: Uuid,
    owner_id: Uuid,
    parking_cost: i64,
    commission_amount: i64,
    net_owner_amount: i64,
    rate: Decimal,
    breakdown: Option<Json<Vec<CommissionLine>>>,
    payout_processed: bool,
    payout_id: Option<Uuid>,
    calculated_at: DateTime<Utc>,
}

impl From<CommissionRow> for Commission {
    fn from(row: CommissionRow) -> Self {
        Self {
            id: row.id,
            reservation_id: row.reservation_id,
            owner_id: row.owner_id,
            parking_cost: row.parking_cost,
            commission_amount: row.commission_amount,
            net_owner_amount: row.net_owner_amount,
            rate: row.rate,
            breakdown: row.breakdown.map(|b| b.0),
            payout_processed: row.payout_processed,
            payout_id: row.payout_id,
            calculated_at: row.calculated_at,
        }
    }
}

/// PostgreSQL implementation of OperationalFeeRepository
pub struct PgOperationalFeeRepository {
    pool: PgPool,
}

impl PgOperationalFeeRepository {
    /// Create a new fee repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationalFeeRepository for PgOperationalFeeRepository {
    #[instrument(skip(self))]
    async fn find_by_reservation(&self, reservation_id: Uuid) -> AppResult<Option<OperationalFee>> {
        let row = sqlx::query_as::<sqlx::Postgres, FeeRow>(
            r#"
            SELECT id, reservation_id, parking_cost, fee_amount, total_charged, rate,
                   created_at, updated_at
            FROM operational_fees
            WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding operational fee: {}", e);
            AppError::Database(format!("Failed to find operational fee: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, fee), fields(reservation_id = %fee.reservation_id))]
    async fn create(&self, fee: &OperationalFee) -> AppResult<OperationalFee> {
        let row = sqlx::query_as::<sqlx::Postgres, FeeRow>(
            r#"
            INSERT INTO operational_fees (
                id, reservation_id, parking_cost, fee_amount, total_charged, rate
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, reservation_id, parking_cost, fee_amount, total_charged, rate,
                      created_at, updated_at
            "#,
        )
        .bind(fee.id)
        .bind(fee.reservation_id)
        .bind(fee.parking_cost)
        .bind(fee.fee_amount)
        .bind(fee.total_charged)
        .bind(fee.rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error creating operational fee: {}", e);
            AppError::Database(format!("Failed to create operational fee: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, fee), fields(reservation_id = %fee.reservation_id))]
    async fn update(&self, fee: &OperationalFee) -> AppResult<OperationalFee> {
        let row = sqlx::query_as::<sqlx::Postgres, FeeRow>(
            r#"
            UPDATE operational_fees
            SET parking_cost = $2,
                fee_amount = $3,
                total_charged = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, reservation_id, parking_cost, fee_amount, total_charged, rate,
                      created_at, updated_at
            "#,
        )
        .bind(fee.id)
        .bind(fee.parking_cost)
        .bind(fee.fee_amount)
        .bind(fee.total_charged)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating operational fee {}: {}", fee.id, e);
            AppError::Database(format!("Failed to update operational fee: {}", e))
        })?;

        row.map(Into::into).ok_or_else(|| {
            AppError::Database(format!("Operational fee {} disappeared", fee.id))
        })
    }

    #[instrument(skip(self))]
    async fn delete_by_reservation(&self, reservation_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM operational_fees WHERE reservation_id = $1")
            .bind(reservation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting operational fee: {}", e);
                AppError::Database(format!("Failed to delete operational fee: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct FeeRow {
    id: Uuid,
    reservation_id: Uuid,
    parking_cost: i64,
    fee_amount: i64,
    total_charged: i64,
    rate: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FeeRow> for OperationalFee {
    fn from(row: FeeRow) -> Self {
        Self {
            id: row.id,
            reservation_id: row.reservation_id,
            parking_cost: row.parking_cost,
            fee_amount: row.fee_amount,
            total_charged: row.total_charged,
            rate: row.rate,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

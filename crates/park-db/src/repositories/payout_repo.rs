//! Owner payout and reconciliation repository implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_core::{
    models::{
        OwnerPayout, PayoutPeriod, PayoutStatus, ReconciliationItem, ReconciliationKind,
    },
    traits::{PayoutRepository, ReconciliationRepository, Repository},
    AppError, AppResult,
};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PAYOUT_COLUMNS: &str = r#"
    id, owner_id, period_year, period_month, gross_amount, commission_amount,
    net_amount, commission_count, status, external_reference, notes,
    created_at, updated_at
"#;

/// PostgreSQL implementation of PayoutRepository
pub struct PgPayoutRepository {
    pool: PgPool,
}

impl PgPayoutRepository {
    /// Create a new payout repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<OwnerPayout, Uuid> for PgPayoutRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<OwnerPayout>> {
        debug!("Finding payout by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, PayoutRow>(&format!(
            "SELECT {} FROM owner_payouts WHERE id = $1",
            PAYOUT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payout {}: {}", id, e);
            AppError::Database(format!("Failed to find payout: {}", e))
        })?;

        row.map(PayoutRow::into_payout).transpose()
    }
}

#[async_trait]
impl PayoutRepository for PgPayoutRepository {
    #[instrument(skip(self, payout, commission_ids), fields(owner_id = %payout.owner_id, period = %payout.period))]
    async fn create_with_commissions(
        &self,
        payout: &OwnerPayout,
        commission_ids: &[Uuid],
    ) -> AppResult<OwnerPayout> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let row = sqlx::query_as::<sqlx::Postgres, PayoutRow>(&format!(
            r#"
            INSERT INTO owner_payouts (
                id, owner_id, period_year, period_month, gross_amount, commission_amount,
                net_amount, commission_count, status, external_reference, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout.id)
        .bind(payout.owner_id)
        .bind(payout.period.year)
        .bind(payout.period.month as i32)
        .bind(payout.gross_amount)
        .bind(payout.commission_amount)
        .bind(payout.net_amount)
        .bind(payout.commission_count)
        .bind(payout.status.to_string())
        .bind(&payout.external_reference)
        .bind(&payout.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating payout: {}", e);
            AppError::Database(format!("Failed to create payout: {}", e))
        })?;

        let claimed = sqlx::query(
            r#"
            UPDATE commissions
            SET payout_processed = TRUE,
                payout_id = $1
            WHERE id = ANY($2)
              AND payout_processed = FALSE
            "#,
        )
        .bind(payout.id)
        .bind(commission_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error marking commissions processed: {}", e);
            AppError::Database(format!("Failed to mark commissions processed: {}", e))
        })?;

        if claimed.rows_affected() != commission_ids.len() as u64 {
            warn!(
                "Only {} of {} commissions were still unprocessed, rolling back",
                claimed.rows_affected(),
                commission_ids.len()
            );
            return Err(AppError::Transaction(
                "commissions were claimed by another payout".to_string(),
            ));
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Payout {} created for {} commissions",
            row.id,
            commission_ids.len()
        );
        row.into_payout()
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        id: Uuid,
        status: PayoutStatus,
        external_reference: Option<&str>,
        notes: Option<&str>,
    ) -> AppResult<OwnerPayout> {
        let row = sqlx::query_as::<sqlx::Postgres, PayoutRow>(&format!(
            r#"
            UPDATE owner_payouts
            SET status = $2,
                external_reference = COALESCE($3, external_reference),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(id)
        .bind(status.to_string())
        .bind(external_reference)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating payout {}: {}", id, e);
            AppError::Database(format!("Failed to update payout: {}", e))
        })?;

        row.ok_or(AppError::PayoutNotFound(id))?.into_payout()
    }

    #[instrument(skip(self))]
    async fn list_by_period(&self, period: PayoutPeriod) -> AppResult<Vec<OwnerPayout>> {
        let rows = sqlx::query_as::<sqlx::Postgres, PayoutRow>(&format!(
            r#"
            SELECT {}
            FROM owner_payouts
            WHERE period_year = $1 AND period_month = $2
            ORDER BY owner_id
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(period.year)
        .bind(period.month as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing payouts for {}: {}", period, e);
            AppError::Database(format!("Failed to list payouts: {}", e))
        })?;

        rows.into_iter().map(PayoutRow::into_payout).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct PayoutRow {
    id: Uuid,
    owner_id: Uuid,
    period_year: i32,
    period_month: i32,
    gross_amount: i64,
    commission_amount: i64,
    net_amount: i64,
    commission_count: i32,
    status: String,
    external_reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PayoutRow {
    fn into_payout(self) -> AppResult<OwnerPayout> {
        let period = PayoutPeriod::new(self.period_year, self.period_month as u32)?;
        let status = PayoutStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Database(format!("Unknown payout status '{}'", self.status))
        })?;

        Ok(OwnerPayout {
            id: self.id,
            owner_id: self.owner_id,
            period,
            gross_amount: self.gross_amount,
            commission_amount: self.commission_amount,
            net_amount: self.net_amount,
            commission_count: self.commission_count,
            status,
            external_reference: self.external_reference,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// PostgreSQL implementation of ReconciliationRepository
pub struct PgReconciliationRepository {
    pool: PgPool,
}

impl PgReconciliationRepository {
    /// Create a new reconciliation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationRepository for PgReconciliationRepository {
    #[instrument(skip(self, item), fields(kind = %item.kind, entity_id = %item.entity_id))]
    async fn record(&self, item: &ReconciliationItem) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_items (
                id, kind, entity_type, entity_id, details, resolved, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(item.kind.to_string())
        .bind(&item.entity_type)
        .bind(item.entity_id)
        .bind(&item.details)
        .bind(item.resolved)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording reconciliation item: {}", e);
            AppError::Database(format!("Failed to record reconciliation item: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_unresolved(&self, limit: i64) -> AppResult<Vec<ReconciliationItem>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ReconciliationRow>(
            r#"
            SELECT id, kind, entity_type, entity_id, details, resolved, created_at
            FROM reconciliation_items
            WHERE resolved = FALSE
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing reconciliation items: {}", e);
            AppError::Database(format!("Failed to list reconciliation items: {}", e))
        })?;

        Ok(rows.into_iter().filter_map(ReconciliationRow::into_item).collect())
    }

    #[instrument(skip(self))]
    async fn resolve(&self, id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE reconciliation_items SET resolved = TRUE WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error resolving reconciliation item: {}", e);
                    AppError::Database(format!("Failed to resolve reconciliation item: {}", e))
                })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReconciliationRow {
    id: Uuid,
    kind: String,
    entity_type: String,
    entity_id: Uuid,
    details: Option<JsonValue>,
    resolved: bool,
    created_at: DateTime<Utc>,
}

impl ReconciliationRow {
    fn into_item(self) -> Option<ReconciliationItem> {
        let Some(kind) = ReconciliationKind::from_str(&self.kind) else {
            warn!("Skipping reconciliation item {} of unknown kind '{}'", self.id, self.kind);
            return None;
        };
        Some(ReconciliationItem {
            id: self.id,
            kind,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            details: self.details,
            resolved: self.resolved,
            created_at: self.created_at,
        })
    }
}

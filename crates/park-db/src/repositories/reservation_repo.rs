//! Reservation repository implementation
//!
//! Provides PostgreSQL-backed storage for parking reservations. Every range
//! query is restricted to blocking statuses; inserts are serialized per
//! resource and per vehicle with transaction-scoped advisory locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_core::{
    models::{normalize_plate, Reservation, ReservationStatus, TimeWindow},
    traits::{Repository, ReservationRepository},
    AppError, AppResult,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const RESERVATION_COLUMNS: &str = r#"
    id, resource_id, requester_id, vehicle_id, license_plate,
    start_time, end_time, status, total_price, approval_expires_at,
    created_at, updated_at
"#;

/// PostgreSQL implementation of ReservationRepository
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    /// Create a new reservation repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse reservation status from string
    fn parse_status(s: &str) -> ReservationStatus {
        ReservationStatus::from_str(s).unwrap_or_else(|| {
            warn!("Unknown reservation status '{}', treating as cancelled", s);
            ReservationStatus::Cancelled
        })
    }

    /// Advisory lock keys for an insert, sorted so that concurrent inserts
    /// always lock in the same order
    fn lock_keys(reservation: &Reservation) -> Vec<String> {
        let mut keys = vec![format!("resource:{}", reservation.resource_id)];
        if let Some(vehicle_id) = reservation.vehicle_id {
            keys.push(format!("vehicle:{}", vehicle_id));
        }
        if let Some(plate) = reservation
            .license_plate
            .as_deref()
            .map(normalize_plate)
            .filter(|p| !p.is_empty())
        {
            keys.push(format!("plate:{}", plate));
        }
        keys.sort();
        keys
    }

    /// Open a transaction holding the advisory locks of `keys` until it ends
    async fn begin_locked(&self, keys: &[String]) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        for key in keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to take lock {}: {}", key, e);
                    AppError::Transaction(format!("Failed to lock {}: {}", key, e))
                })?;
        }

        Ok(tx)
    }

    /// First blocking reservation, other than `reservation` itself, overlapping its window
    async fn first_conflict(
        tx: &mut Transaction<'static, Postgres>,
        reservation: &Reservation,
    ) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE resource_id = $1
              AND status = ANY($2)
              AND start_time < $4
              AND end_time > $3
              AND id <> $5
            ORDER BY start_time
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.resource_id)
        .bind(Self::blocking_statuses())
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            error!("Database error re-checking overlap: {}", e);
            AppError::Database(format!("Failed to check overlap: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    /// First blocking reservation on any resource held by the same vehicle
    async fn first_vehicle_conflict(
        tx: &mut Transaction<'static, Postgres>,
        reservation: &Reservation,
    ) -> AppResult<Option<Reservation>> {
        let plate = reservation
            .license_plate
            .as_deref()
            .map(normalize_plate)
            .filter(|p| !p.is_empty());
        if reservation.vehicle_id.is_none() && plate.is_none() {
            return Ok(None);
        }

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE status = ANY($1)
              AND start_time < $3
              AND end_time > $2
              AND (
                    ($4::uuid IS NOT NULL AND vehicle_id = $4)
                 OR ($5::text IS NOT NULL AND plate_normalized = $5)
              )
              AND id <> $6
            ORDER BY start_time
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(Self::blocking_statuses())
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.vehicle_id)
        .bind(plate)
        .bind(reservation.id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            error!("Database error re-checking vehicle overlap: {}", e);
            AppError::Database(format!("Failed to check vehicle overlap: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }

    /// Blocking statuses as bind values
    fn blocking_statuses() -> Vec<String> {
        ReservationStatus::blocking()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl Repository<Reservation, Uuid> for PgReservationRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Reservation>> {
        debug!("Finding reservation by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding reservation {}: {}", id, e);
            AppError::Database(format!("Failed to find reservation: {}", e))
        })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    #[instrument(skip(self))]
    async fn find_covering(
        &self,
        resource_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE resource_id = $1
              AND status = ANY($2)
              AND start_time <= $3
              AND end_time > $3
            ORDER BY start_time
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(resource_id)
        .bind(Self::blocking_statuses())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding covering reservation: {}", e);
            AppError::Database(format!("Failed to find covering reservation: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_next_blocking_after(
        &self,
        resource_id: Uuid,
        after: DateTime<Utc>,
    ) -> AppResult<Option<Reservation>> {
        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE resource_id = $1
              AND status = ANY($2)
              AND start_time > $3
            ORDER BY start_time
            LIMIT 1
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(resource_id)
        .bind(Self::blocking_statuses())
        .bind(after)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding next reservation: {}", e);
            AppError::Database(format!("Failed to find next reservation: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_overlapping(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE resource_id = $1
              AND status = ANY($2)
              AND start_time < $4
              AND end_time > $3
              AND ($5::uuid IS NULL OR id <> $5)
            ORDER BY start_time
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(resource_id)
        .bind(Self::blocking_statuses())
        .bind(window.start)
        .bind(window.end)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding overlapping reservations: {}", e);
            AppError::Database(format!("Failed to find overlapping reservations: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_vehicle_overlapping(
        &self,
        vehicle_id: Option<Uuid>,
        normalized_plate: Option<&str>,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Reservation>> {
        let plate = normalized_plate.filter(|p| !p.is_empty());
        if vehicle_id.is_none() && plate.is_none() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE status = ANY($1)
              AND start_time < $3
              AND end_time > $2
              AND (
                    ($4::uuid IS NOT NULL AND vehicle_id = $4)
                 OR ($5::text IS NOT NULL AND plate_normalized = $5)
              )
              AND ($6::uuid IS NULL OR id <> $6)
            ORDER BY start_time
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(Self::blocking_statuses())
        .bind(window.start)
        .bind(window.end)
        .bind(vehicle_id)
        .bind(plate)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding vehicle conflicts: {}", e);
            AppError::Database(format!("Failed to find vehicle conflicts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, reservation), fields(resource_id = %reservation.resource_id))]
    async fn insert_if_free(
        &self,
        reservation: &Reservation,
    ) -> AppResult<Result<Reservation, Reservation>> {
        let mut tx = self.begin_locked(&Self::lock_keys(reservation)).await?;

        if let Some(existing) = Self::first_conflict(&mut tx, reservation).await? {
            warn!(
                "Insert refused, reservation {} already holds the window",
                existing.id
            );
            // Dropping the transaction rolls back and releases the locks
            return Ok(Err(existing));
        }
        if let Some(existing) = Self::first_vehicle_conflict(&mut tx, reservation).await? {
            warn!(
                "Insert refused, vehicle already holds reservation {}",
                existing.id
            );
            return Ok(Err(existing));
        }

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            INSERT INTO reservations (
                id, resource_id, requester_id, vehicle_id, license_plate, plate_normalized,
                start_time, end_time, status, total_price, approval_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.id)
        .bind(reservation.resource_id)
        .bind(reservation.requester_id)
        .bind(reservation.vehicle_id)
        .bind(&reservation.license_plate)
        .bind(reservation.license_plate.as_deref().map(normalize_plate))
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.status.to_string())
        .bind(reservation.total_price)
        .bind(reservation.approval_expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating reservation: {}", e);
            AppError::Database(format!("Failed to create reservation: {}", e))
        })?;

        Self::commit(tx).await?;

        info!("Reservation {} stored", row.id);
        Ok(Ok(row.into()))
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id))]
    async fn extend_if_free(
        &self,
        reservation: &Reservation,
    ) -> AppResult<Result<Reservation, Reservation>> {
        let resource_key = format!("resource:{}", reservation.resource_id);
        let mut tx = self.begin_locked(&[resource_key]).await?;

        if let Some(existing) = Self::first_conflict(&mut tx, reservation).await? {
            warn!(
                "Extension refused, reservation {} overlaps the new end",
                existing.id
            );
            return Ok(Err(existing));
        }

        let row = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            UPDATE reservations
            SET end_time = $2,
                total_price = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.id)
        .bind(reservation.end_time)
        .bind(reservation.total_price)
        .bind(Self::blocking_statuses())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error extending reservation {}: {}", reservation.id, e);
            AppError::Database(format!("Failed to extend reservation: {}", e))
        })?
        .ok_or(AppError::ReservationNotFound(reservation.id))?;

        Self::commit(tx).await?;

        info!("Reservation {} now ends at {}", row.id, row.end_time);
        Ok(Ok(row.into()))
    }

    #[instrument(skip(self))]
    async fn find_expired_pending(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<sqlx::Postgres, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE status = $1
              AND approval_expires_at IS NOT NULL
              AND approval_expires_at <= $2
            ORDER BY approval_expires_at
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(ReservationStatus::PendingApproval.to_string())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding expired approvals: {}", e);
            AppError::Database(format!("Failed to find expired approvals: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $3,
                approval_expires_at = CASE WHEN $3 = 'pending_approval'
                                           THEN approval_expires_at ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating reservation status: {}", e);
            AppError::Database(format!("Failed to update reservation status: {}", e))
        })?;

        Ok(result.rows_affected() == 1)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    resource_id: Uuid,
    requester_id: Uuid,
    vehicle_id: Option<Uuid>,
    license_plate: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    total_price: i64,
    approval_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            resource_id: row.resource_id,
            requester_id: row.requester_id,
            vehicle_id: row.vehicle_id,
            license_plate: row.license_plate,
            start_time: row.start_time,
            end_time: row.end_time,
            status: PgReservationRepository::parse_status(&row.status),
            total_price: row.total_price,
            approval_expires_at: row.approval_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

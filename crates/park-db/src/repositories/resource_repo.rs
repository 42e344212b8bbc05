//! Parking resource repository implementation
//!
//! Schedules live in a JSONB column in the weekday-key format, next to a
//! `schedule_granularity` column holding the block width (3 or 4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use park_core::{
    models::{validate_schedule, Granularity, ParkingResource, PriceTable, WeeklySchedule},
    traits::{Repository, ResourceRepository},
    AppError, AppResult,
};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of ResourceRepository
pub struct PgResourceRepository {
    pool: PgPool,
}

impl PgResourceRepository {
    /// Create a new resource repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Decode a stored schedule; a missing granularity column is inferred from the hours
    fn decode_schedule(
        raw: Option<JsonValue>,
        granularity: Option<i16>,
    ) -> AppResult<Option<WeeklySchedule>> {
        let Some(raw) = raw.filter(|v| !v.is_null()) else {
            return Ok(None);
        };

        let granularity = match granularity.and_then(Granularity::from_hours) {
            Some(g) => g,
            None => validate_schedule(&raw, None)
                .detected_granularity
                .granularity()
                .unwrap_or(Granularity::ThreeHour),
        };

        WeeklySchedule::from_json(&raw, granularity)
            .map(Some)
            .map_err(|errors| AppError::InvalidSchedule(errors.join("; ")))
    }
}

#[async_trait]
impl Repository<ParkingResource, Uuid> for PgResourceRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ParkingResource>> {
        debug!("Finding parking resource by id: {}", id);

        let row = sqlx::query_as::<sqlx::Postgres, ResourceRow>(
            r#"
            SELECT
                id, owner_id, is_active, owner_blocked,
                price_table, hourly_rate,
                schedule, schedule_granularity, time_zone,
                created_at, updated_at
            FROM parking_resources
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding parking resource {}: {}", id, e);
            AppError::Database(format!("Failed to find parking resource: {}", e))
        })?;

        row.map(ResourceRow::into_resource).transpose()
    }
}

#[async_trait]
impl ResourceRepository for PgResourceRepository {
    #[instrument(skip(self, schedule))]
    async fn update_schedule(
        &self,
        id: Uuid,
        schedule: Option<&WeeklySchedule>,
    ) -> AppResult<()> {
        debug!("Updating schedule of parking resource {}", id);

        let result = sqlx::query(
            r#"
            UPDATE parking_resources
            SET schedule = $2,
                schedule_granularity = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(schedule.map(WeeklySchedule::to_json))
        .bind(schedule.map(|s| s.granularity.as_hours()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating schedule of {}: {}", id, e);
            AppError::Database(format!("Failed to update schedule: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::ResourceNotFound(id));
        }
        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    owner_id: Uuid,
    is_active: bool,
    owner_blocked: bool,
    price_table: Option<Json<PriceTable>>,
    hourly_rate: i64,
    schedule: Option<JsonValue>,
    schedule_granularity: Option<i16>,
    time_zone: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn into_resource(self) -> AppResult<ParkingResource> {
        let schedule =
            PgResourceRepository::decode_schedule(self.schedule, self.schedule_granularity)?;

        let time_zone = self.time_zone.as_deref().and_then(|name| {
            name.parse::<Tz>()
                .map_err(|_| warn!("Unknown time zone '{}' on resource {}", name, self.id))
                .ok()
        });

        Ok(ParkingResource {
            id: self.id,
            owner_id: self.owner_id,
            is_active: self.is_active,
            owner_blocked: self.owner_blocked,
            price_table: self.price_table.map(|t| t.0),
            hourly_rate: self.hourly_rate,
            schedule,
            time_zone,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

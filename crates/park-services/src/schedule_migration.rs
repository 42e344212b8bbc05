//! Schedule migration between the 4-hour and 3-hour encodings
//!
//! The two conversion tables are one-way transforms. A converted schedule is
//! only stored when it still makes every originally available hour available;
//! anything that does not convert back exactly is flagged for review.

use park_core::{
    models::{
        validate_schedule, Granularity, ReconciliationItem, ReconciliationKind, ScheduleValidation,
        WeeklySchedule,
    },
    traits::{ReconciliationRepository, ResourceRepository},
    AppError, AppResult,
};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Result of migrating one resource's schedule
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub resource_id: Uuid,
    pub from: Granularity,
    pub to: Granularity,
    pub migrated: WeeklySchedule,
    /// Every originally available hour is still available
    pub covers_original: bool,
    /// Converting back reproduces the original exactly
    pub round_trip_exact: bool,
    pub persisted: bool,
    pub flagged: bool,
}

pub struct ScheduleMigrationService {
    resources: Arc<dyn ResourceRepository>,
    reconciliation: Arc<dyn ReconciliationRepository>,
}

impl ScheduleMigrationService {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        reconciliation: Arc<dyn ReconciliationRepository>,
    ) -> Self {
        Self {
            resources,
            reconciliation,
        }
    }

    /// Validate a serialized schedule without storing it
    pub fn validate(&self, raw: &JsonValue, expected: Option<Granularity>) -> ScheduleValidation {
        validate_schedule(raw, expected)
    }

    /// Convert the stored schedule of `resource_id` to `target`
    #[instrument(skip(self))]
    pub async fn migrate_resource_schedule(
        &self,
        resource_id: Uuid,
        target: Granularity,
    ) -> AppResult<MigrationOutcome> {
        let resource = self
            .resources
            .find_by_id(resource_id)
            .await?
            .ok_or(AppError::ResourceNotFound(resource_id))?;
        let original = resource.schedule.ok_or_else(|| {
            AppError::InvalidSchedule("parking resource has no schedule".to_string())
        })?;

        let from = original.granularity;
        let migrated = original.migrate(target);
        let covers_original = migrated.covers(&original);
        let round_trip_exact = migrated.migrate(from) == original;

        let persisted = from != target && covers_original;
        if persisted {
            self.resources
                .update_schedule(resource_id, Some(&migrated))
                .await?;
            info!("Migrated schedule of {} from {} to {}", resource_id, from, target);
        }

        let flagged = !covers_original || !round_trip_exact;
        if flagged {
            let lost: Vec<String> = original
                .available_hours()
                .difference(&migrated.available_hours())
                .map(|(day, hour)| format!("{}:{}", day.as_str(), hour))
                .collect();
            warn!(
                "Schedule of {} does not round-trip {} -> {} ({} hours lost)",
                resource_id,
                from,
                target,
                lost.len()
            );
            let item = ReconciliationItem::for_resource(
                ReconciliationKind::ScheduleRoundTripMismatch,
                resource_id,
                json!({
                    "from": from.to_string(),
                    "to": target.to_string(),
                    "original": original.to_json(),
                    "migrated": migrated.to_json(),
                    "lost_hours": lost,
                    "persisted": persisted,
                }),
            );
            if let Err(e) = self.reconciliation.record(&item).await {
                error!("Failed to flag schedule of {}: {}", resource_id, e);
            }
        }

        Ok(MigrationOutcome {
            resource_id,
            from,
            to: target,
            migrated,
            covers_original,
            round_trip_exact,
            persisted,
            flagged,
        })
    }
}

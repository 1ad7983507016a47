use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::{DowntimeSubmission, OutboxRecord};
use crate::sync::SyncRegistrar;

/// Persist a submission as a new outbox record. Never touches the network.
///
/// The id is generated here (UUID v7) for every write, regardless of which
/// execution context performs it.
pub async fn persist(
    pool: &SqlitePool,
    submission: DowntimeSubmission,
) -> Result<OutboxRecord, sqlx::Error> {
    let record = OutboxRecord::from_submission(
        submission,
        Uuid::now_v7(),
        Utc::now().timestamp_millis(),
    );

    db::outbox::insert(pool, &record).await?;

    tracing::info!(
        "Queued downtime for machine {} in outbox ({})",
        record.machine_id,
        record.id
    );

    Ok(record)
}

/// Persist, then ask for a background drain. A missing or stopped
/// background delegate is not an error.
pub async fn enqueue(
    pool: &SqlitePool,
    submission: DowntimeSubmission,
    registrar: Option<&SyncRegistrar>,
) -> Result<OutboxRecord, sqlx::Error> {
    let record = persist(pool, submission).await?;

    if let Some(registrar) = registrar {
        if let Err(e) = registrar.register() {
            tracing::debug!("Background sync not registered: {e}");
        }
    }

    Ok(record)
}

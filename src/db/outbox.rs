use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::OutboxRecord;

pub async fn insert(pool: &SqlitePool, record: &OutboxRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO outbox
            (id, machine_id, reason, category, description,
             image_data, image_mime, audio_data, audio_mime, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id)
    .bind(&record.machine_id)
    .bind(&record.reason)
    .bind(&record.category)
    .bind(&record.description)
    .bind(&record.image_data)
    .bind(&record.image_mime)
    .bind(&record.audio_data)
    .bind(&record.audio_mime)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// All pending records in the order they were written. `created_at` is
/// informational only; a clock step must not reorder the queue.
pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<OutboxRecord>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRecord>(
        "SELECT id, machine_id, reason, category, description,
                image_data, image_mime, audio_data, audio_mime, created_at
         FROM outbox ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<OutboxRecord>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRecord>(
        "SELECT id, machine_id, reason, category, description,
                image_data, image_mime, audio_data, audio_mime, created_at
         FROM outbox WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Delete-if-exists. Returns whether a row was removed; an absent id is not an error.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await
}

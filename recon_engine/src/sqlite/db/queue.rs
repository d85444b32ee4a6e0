use std::time::Duration;

use log::trace;
use serde_json::Value;
use sqlx::{types::Json, FromRow, SqliteConnection};

use crate::{db_types::QueuedMessage, helpers::now_ms, traits::StoreError};

#[derive(Debug, FromRow)]
struct QueueRow {
    id: i64,
    queue: String,
    body: Json<Value>,
    enqueued_at_ms: i64,
    attempts: i64,
    claimed_until_ms: Option<i64>,
}

impl From<QueueRow> for QueuedMessage {
    fn from(row: QueueRow) -> Self {
        Self {
            id: row.id,
            queue: row.queue,
            body: row.body.0,
            enqueued_at_ms: row.enqueued_at_ms,
            attempts: row.attempts,
            claimed_until_ms: row.claimed_until_ms,
        }
    }
}

/// Appends a message. `enqueued_at_ms` is normally now, but requeued messages keep their original time so that
/// retry age limits still apply.
pub async fn push(
    queue: &str,
    body: &Value,
    enqueued_at_ms: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO queue_messages (queue, body, enqueued_at_ms) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(queue)
    .bind(Json(body))
    .bind(enqueued_at_ms)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Message #{id} pushed onto {queue}");
    Ok(id)
}

/// Leases the oldest visible message on `queue` in a single statement, so two consumers can never lease the same
/// message at the same time.
pub async fn pop(queue: &str, lease: Duration, conn: &mut SqliteConnection) -> Result<Option<QueuedMessage>, StoreError> {
    let now = now_ms();
    let until = now + i64::try_from(lease.as_millis()).unwrap_or(i64::MAX / 2);
    let row: Option<QueueRow> = sqlx::query_as(
        r#"
            UPDATE queue_messages SET claimed_until_ms = $2, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND (claimed_until_ms IS NULL OR claimed_until_ms <= $3)
                ORDER BY id LIMIT 1
            )
            RETURNING *;
        "#,
    )
    .bind(queue)
    .bind(until)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(QueuedMessage::from))
}

pub async fn delete(id: i64, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn length(queue: &str, conn: &mut SqliteConnection) -> Result<u64, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_messages WHERE queue = $1").bind(queue).fetch_one(conn).await?;
    Ok(u64::try_from(count).unwrap_or_default())
}

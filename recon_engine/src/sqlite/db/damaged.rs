use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, FromRow, SqliteConnection};

use crate::{
    db_types::{DamagedMessage, NewDamagedMessage},
    traits::StoreError,
};

#[derive(Debug, FromRow)]
struct DamagedRow {
    id: i64,
    original_queue: String,
    body: Json<Value>,
    error: String,
    retry_at_ms: Option<i64>,
    enqueued_at_ms: i64,
    damaged_at: DateTime<Utc>,
}

impl From<DamagedRow> for DamagedMessage {
    fn from(row: DamagedRow) -> Self {
        Self {
            id: row.id,
            original_queue: row.original_queue,
            body: row.body.0,
            error: row.error,
            retry_at_ms: row.retry_at_ms,
            enqueued_at_ms: row.enqueued_at_ms,
            damaged_at: row.damaged_at,
        }
    }
}

pub async fn insert(message: NewDamagedMessage, conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO damaged_messages (original_queue, body, error, retry_at_ms, enqueued_at_ms, damaged_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id;
        "#,
    )
    .bind(message.original_queue)
    .bind(Json(message.body))
    .bind(message.error)
    .bind(message.retry_at_ms)
    .bind(message.enqueued_at_ms)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<DamagedMessage>, StoreError> {
    let row: Option<DamagedRow> =
        sqlx::query_as("SELECT * FROM damaged_messages WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(row.map(DamagedMessage::from))
}

pub async fn fetch_retryable(
    now_ms: i64,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<DamagedMessage>, StoreError> {
    let rows: Vec<DamagedRow> = sqlx::query_as(
        r#"
            SELECT * FROM damaged_messages
            WHERE retry_at_ms IS NOT NULL AND retry_at_ms <= $1
            ORDER BY retry_at_ms, id
            LIMIT $2
        "#,
    )
    .bind(now_ms)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(DamagedMessage::from).collect())
}

/// Deletes and returns the damaged message, so that callers can move it elsewhere inside a transaction.
pub async fn take(id: i64, conn: &mut SqliteConnection) -> Result<Option<DamagedMessage>, StoreError> {
    let row: Option<DamagedRow> =
        sqlx::query_as("DELETE FROM damaged_messages WHERE id = $1 RETURNING *").bind(id).fetch_optional(conn).await?;
    Ok(row.map(DamagedMessage::from))
}

pub async fn delete(id: i64, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM damaged_messages WHERE id = $1").bind(id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_for_queue(queue: &str, conn: &mut SqliteConnection) -> Result<u64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM damaged_messages WHERE original_queue = $1")
        .bind(queue)
        .fetch_one(conn)
        .await?;
    Ok(u64::try_from(count).unwrap_or_default())
}

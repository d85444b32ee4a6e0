use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{FraudRecord, NewFraudRecord},
    traits::StoreError,
};

#[derive(Debug, FromRow)]
struct FraudRow {
    id: i64,
    gateway: String,
    order_id: String,
    contribution_tracking_id: Option<String>,
    payment_method: Option<String>,
    risk_score: f64,
    date: DateTime<Utc>,
    settled: bool,
}

impl From<FraudRow> for FraudRecord {
    fn from(row: FraudRow) -> Self {
        Self {
            id: row.id,
            gateway: row.gateway,
            order_id: row.order_id,
            contribution_tracking_id: row.contribution_tracking_id,
            payment_method: row.payment_method,
            risk_score: row.risk_score,
            date: row.date,
            settled: row.settled,
        }
    }
}

/// Saves the screening result. A repeat screening of the same attempt replaces the earlier one and reopens it.
pub async fn upsert(record: NewFraudRecord, conn: &mut SqliteConnection) -> Result<FraudRecord, StoreError> {
    if !record.risk_score.is_finite() {
        return Err(StoreError::ValidationError(format!("risk_score {} is not a number", record.risk_score)));
    }
    let row: FraudRow = sqlx::query_as(
        r#"
            INSERT INTO payments_fraud (gateway, order_id, contribution_tracking_id, payment_method, risk_score, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (gateway, order_id) DO UPDATE SET
                contribution_tracking_id = excluded.contribution_tracking_id,
                payment_method = excluded.payment_method,
                risk_score = excluded.risk_score,
                date = excluded.date,
                settled = 0
            RETURNING *;
        "#,
    )
    .bind(record.gateway)
    .bind(record.order_id)
    .bind(record.contribution_tracking_id)
    .bind(record.payment_method)
    .bind(record.risk_score)
    .bind(record.date)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Fraud history for {}/{} saved with id {}", row.gateway, row.order_id, row.id);
    Ok(row.into())
}

pub async fn fetch(
    gateway: &str,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FraudRecord>, StoreError> {
    let row: Option<FraudRow> = sqlx::query_as("SELECT * FROM payments_fraud WHERE gateway = $1 AND order_id = $2")
        .bind(gateway)
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(FraudRecord::from))
}

/// Marks the attempt as finalised so that its history can no longer be used to rebuild a pending record.
pub async fn settle(gateway: &str, order_id: &str, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let result =
        sqlx::query("UPDATE payments_fraud SET settled = 1 WHERE gateway = $1 AND order_id = $2 AND settled = 0")
            .bind(gateway)
            .bind(order_id)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

use chrono::{DateTime, Utc};
use log::{debug, trace};
use recon_common::MinorUnits;
use sqlx::{types::Json, FromRow, SqliteConnection};

use crate::{
    db_types::{DonorDetails, NewPendingRecord, PendingRecord},
    traits::StoreError,
};

#[derive(Debug, FromRow)]
struct PendingRow {
    id: i64,
    gateway: String,
    order_id: String,
    gateway_txn_id: Option<String>,
    captured: bool,
    capture_claim: Option<String>,
    risk_score: f64,
    amount: MinorUnits,
    currency: String,
    payment_method: Option<String>,
    recurring: bool,
    recurring_token: Option<String>,
    processor_contact_id: Option<String>,
    donor: Json<DonorDetails>,
    date: DateTime<Utc>,
}

impl From<PendingRow> for PendingRecord {
    fn from(row: PendingRow) -> Self {
        Self {
            id: row.id,
            gateway: row.gateway,
            order_id: row.order_id,
            gateway_txn_id: row.gateway_txn_id,
            captured: row.captured,
            capture_claim: row.capture_claim,
            risk_score: row.risk_score,
            amount: row.amount,
            currency: row.currency,
            payment_method: row.payment_method,
            recurring: row.recurring,
            recurring_token: row.recurring_token,
            processor_contact_id: row.processor_contact_id,
            donor: row.donor.0,
            date: row.date,
        }
    }
}

pub async fn fetch_by_order_id(
    gateway: &str,
    order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingRecord>, StoreError> {
    let row: Option<PendingRow> = sqlx::query_as("SELECT * FROM pending WHERE gateway = $1 AND order_id = $2 LIMIT 1")
        .bind(gateway)
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(PendingRecord::from))
}

/// Inserts the record, or refreshes the donor-side fields of an existing one. Capture state is never overwritten, and
/// neither is a recurring token that a contract confirmation stored before the checkout flow wrote again.
pub async fn upsert(record: NewPendingRecord, conn: &mut SqliteConnection) -> Result<PendingRecord, StoreError> {
    record.validate().map_err(|e| StoreError::ValidationError(e.to_string()))?;
    let row: PendingRow = sqlx::query_as(
        r#"
            INSERT INTO pending (
                gateway,
                order_id,
                risk_score,
                amount,
                currency,
                payment_method,
                recurring,
                recurring_token,
                donor,
                date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (gateway, order_id) DO UPDATE SET
                risk_score = excluded.risk_score,
                amount = excluded.amount,
                currency = excluded.currency,
                payment_method = excluded.payment_method,
                recurring = excluded.recurring,
                recurring_token = COALESCE(excluded.recurring_token, pending.recurring_token),
                donor = excluded.donor,
                date = excluded.date
            RETURNING *;
        "#,
    )
    .bind(record.gateway)
    .bind(record.order_id)
    .bind(record.risk_score)
    .bind(record.amount)
    .bind(record.currency)
    .bind(record.payment_method)
    .bind(record.recurring)
    .bind(record.recurring_token)
    .bind(Json(record.donor))
    .bind(record.date)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Pending record {}/{} saved with id {}", row.gateway, row.order_id, row.id);
    Ok(row.into())
}

/// Deletes the record only while no transaction owns it. A record that was claimed or captured since the caller read
/// it is left alone.
pub async fn delete_unowned(gateway: &str, order_id: &str, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            DELETE FROM pending
            WHERE gateway = $1 AND order_id = $2 AND captured = 0 AND capture_claim IS NULL
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the record and returns its `(gateway, order_id)` key, or `None` if it was already gone.
pub async fn delete_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<(String, String)>, StoreError> {
    let key: Option<(String, String)> = sqlx::query_as("DELETE FROM pending WHERE id = $1 RETURNING gateway, order_id")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(key)
}

pub async fn set_recurring_token(
    gateway: &str,
    order_id: &str,
    token: &str,
    processor_contact_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            UPDATE pending SET
                recurring_token = $3,
                processor_contact_id = COALESCE($4, processor_contact_id)
            WHERE gateway = $1 AND order_id = $2
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .bind(token)
    .bind(processor_contact_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Rebuilds a missing pending record from the unsettled fraud history row for the same attempt. The processor's
/// notification supplies the amount and currency, which the history row doesn't carry. An existing record is never
/// touched. Returns true if a record was created.
pub async fn insert_from_fraud_history(
    gateway: &str,
    order_id: &str,
    amount: MinorUnits,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            INSERT INTO pending (
                gateway, order_id, risk_score, amount, currency, payment_method, recurring, donor, date
            )
            SELECT
                gateway,
                order_id,
                risk_score,
                $3,
                $4,
                payment_method,
                0,
                json_object('contribution_tracking_id', contribution_tracking_id),
                date
            FROM payments_fraud
            WHERE gateway = $1 AND order_id = $2 AND settled = 0
            ON CONFLICT (gateway, order_id) DO NOTHING;
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .bind(amount)
    .bind(currency)
    .execute(conn)
    .await?;
    let restored = result.rows_affected() == 1;
    if restored {
        debug!("🗃️ Pending record {gateway}/{order_id} rebuilt from fraud history");
    }
    Ok(restored)
}

/// The compare-and-set that guards the capture call. A single UPDATE is atomic in SQLite, so of several concurrent
/// callers exactly one sees a row change.
pub async fn try_claim_capture(
    gateway: &str,
    order_id: &str,
    gateway_txn_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            UPDATE pending SET capture_claim = $3
            WHERE gateway = $1 AND order_id = $2 AND captured = 0 AND capture_claim IS NULL
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .bind(gateway_txn_id)
    .execute(conn)
    .await?;
    let claimed = result.rows_affected() == 1;
    trace!("🗃️ Capture claim on {gateway}/{order_id} for {gateway_txn_id}: {claimed}");
    Ok(claimed)
}

pub async fn mark_captured(
    gateway: &str,
    order_id: &str,
    gateway_txn_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            UPDATE pending SET captured = 1, gateway_txn_id = $3, capture_claim = NULL
            WHERE gateway = $1 AND order_id = $2 AND captured = 0 AND capture_claim = $3
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .bind(gateway_txn_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_capture_claim(
    gateway: &str,
    order_id: &str,
    gateway_txn_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
            UPDATE pending SET capture_claim = NULL
            WHERE gateway = $1 AND order_id = $2 AND captured = 0 AND capture_claim = $3
        "#,
    )
    .bind(gateway)
    .bind(order_id)
    .bind(gateway_txn_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Deletes records dated before `cutoff`. Records with a capture in flight are kept for an operator to look at.
pub async fn delete_older_than(
    gateway: Option<&str>,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, StoreError> {
    let result = match gateway {
        Some(gateway) => {
            sqlx::query("DELETE FROM pending WHERE gateway = $1 AND date < $2 AND capture_claim IS NULL")
                .bind(gateway)
                .bind(cutoff)
                .execute(conn)
                .await?
        },
        None => {
            sqlx::query("DELETE FROM pending WHERE date < $1 AND capture_claim IS NULL").bind(cutoff).execute(conn).await?
        },
    };
    Ok(result.rows_affected())
}

//! `SqliteDatabase` is a concrete implementation of a reconciliation backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use recon_common::MinorUnits;
use serde_json::Value;
use sqlx::SqlitePool;

use super::db::{damaged, db_url, fraud, new_pool, pending, queue};
use crate::{
    db_types::{
        DamagedMessage,
        FraudRecord,
        NewDamagedMessage,
        NewFraudRecord,
        NewPendingRecord,
        PendingRecord,
        QueuedMessage,
    },
    helpers::now_ms,
    traits::{DamagedStore, FraudStore, JobQueue, PendingStore, ReconciliationDatabase, StoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PendingStore for SqliteDatabase {
    async fn fetch_by_order_id(&self, gateway: &str, order_id: &str) -> Result<Option<PendingRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::fetch_by_order_id(gateway, order_id, &mut conn).await
    }

    async fn store_pending(&self, record: NewPendingRecord) -> Result<PendingRecord, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::upsert(record, &mut conn).await
    }

    async fn try_claim_capture(
        &self,
        gateway: &str,
        order_id: &str,
        gateway_txn_id: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::try_claim_capture(gateway, order_id, gateway_txn_id, &mut conn).await
    }

    async fn mark_captured(&self, gateway: &str, order_id: &str, gateway_txn_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::mark_captured(gateway, order_id, gateway_txn_id, &mut conn).await
    }

    async fn release_capture_claim(
        &self,
        gateway: &str,
        order_id: &str,
        gateway_txn_id: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::release_capture_claim(gateway, order_id, gateway_txn_id, &mut conn).await
    }

    async fn store_recurring_token(
        &self,
        gateway: &str,
        order_id: &str,
        token: &str,
        processor_contact_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::set_recurring_token(gateway, order_id, token, processor_contact_id, &mut conn).await
    }

    async fn delete_pending_older_than(&self, gateway: Option<&str>, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::delete_older_than(gateway, cutoff, &mut conn).await
    }
}

impl FraudStore for SqliteDatabase {
    async fn store_fraud_record(&self, record: NewFraudRecord) -> Result<FraudRecord, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fraud::upsert(record, &mut conn).await
    }

    async fn fetch_fraud_record(&self, gateway: &str, order_id: &str) -> Result<Option<FraudRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fraud::fetch(gateway, order_id, &mut conn).await
    }
}

impl JobQueue for SqliteDatabase {
    async fn push(&self, queue: &str, body: &Value) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queue::push(queue, body, now_ms(), &mut conn).await
    }

    async fn pop(&self, queue: &str, lease: Duration) -> Result<Option<QueuedMessage>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queue::pop(queue, lease, &mut conn).await
    }

    async fn ack(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        if !queue::delete(id, &mut conn).await? {
            warn!("🗃️ Tried to ack message #{id}, but it was no longer on the queue");
        }
        Ok(())
    }

    async fn queue_length(&self, queue: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        queue::length(queue, &mut conn).await
    }
}

impl DamagedStore for SqliteDatabase {
    async fn store_damaged(&self, message: NewDamagedMessage) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let queue = message.original_queue.clone();
        let id = damaged::insert(message, &mut conn).await?;
        debug!("🚑️ Damaged message #{id} stored for queue {queue}");
        Ok(id)
    }

    async fn fetch_damaged(&self, id: i64) -> Result<Option<DamagedMessage>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        damaged::fetch(id, &mut conn).await
    }

    async fn fetch_retryable(&self, now_ms: i64, limit: u32) -> Result<Vec<DamagedMessage>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        damaged::fetch_retryable(now_ms, limit, &mut conn).await
    }

    async fn requeue_damaged(&self, id: i64) -> Result<Option<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let message = match damaged::take(id, &mut tx).await? {
            Some(m) => m,
            None => return Ok(None),
        };
        let new_id = queue::push(&message.original_queue, &message.body, message.enqueued_at_ms, &mut tx).await?;
        tx.commit().await?;
        debug!("🚑️ Damaged message #{id} requeued on {} as #{new_id}", message.original_queue);
        Ok(Some(new_id))
    }

    async fn delete_damaged(&self, id: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        damaged::delete(id, &mut conn).await
    }

    async fn count_damaged(&self, queue: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        damaged::count_for_queue(queue, &mut conn).await
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Deletes the pending record and publishes the outcome message in a single atomic transaction.
    async fn consume_pending(&self, pending_id: i64, queue: &str, message: &Value) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let (gateway, order_id) = match pending::delete_by_id(pending_id, &mut tx).await? {
            Some(key) => key,
            None => {
                debug!("🗃️ Pending record #{pending_id} was already consumed. Nothing published to {queue}");
                return Ok(false);
            },
        };
        fraud::settle(&gateway, &order_id, &mut tx).await?;
        let id = queue::push(queue, message, now_ms(), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Pending record #{pending_id} consumed and published to {queue} as message #{id}");
        Ok(true)
    }

    async fn discard_pending(&self, gateway: &str, order_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !pending::delete_unowned(gateway, order_id, &mut tx).await? {
            debug!("🗃️ Pending record {gateway}/{order_id} is gone or owned by a capture. It was not discarded");
            return Ok(false);
        }
        fraud::settle(gateway, order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Pending record {gateway}/{order_id} discarded");
        Ok(true)
    }

    async fn restore_pending(
        &self,
        gateway: &str,
        order_id: &str,
        amount: MinorUnits,
        currency: &str,
    ) -> Result<Option<PendingRecord>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        pending::insert_from_fraud_history(gateway, order_id, amount, currency, &mut conn).await?;
        pending::fetch_by_order_id(gateway, order_id, &mut conn).await
    }

    async fn move_to_damaged(&self, message: &QueuedMessage, damaged: NewDamagedMessage) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        queue::delete(message.id, &mut tx).await?;
        let id = damaged::insert(damaged, &mut tx).await?;
        tx.commit().await?;
        debug!("🚑️ Message #{} moved from {} to the damaged store as #{id}", message.id, message.queue);
        Ok(id)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }
}

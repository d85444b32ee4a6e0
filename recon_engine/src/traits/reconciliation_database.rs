use serde_json::Value;
use thiserror::Error;

use recon_common::MinorUnits;

use crate::{
    db_types::{NewDamagedMessage, PendingRecord, QueuedMessage},
    traits::{DamagedStore, FraudStore, JobQueue, PendingStore},
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Could not (de)serialize a stored value. {0}")]
    SerializationError(String),
    #[error("Invalid record. {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// This trait defines the highest level of behaviour for reconciliation backends: everything in [`PendingStore`],
/// [`FraudStore`], [`JobQueue`] and [`DamagedStore`], plus the operations that have to touch more than one of them in a
/// single atomic transaction.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: PendingStore + FraudStore + JobQueue + DamagedStore {
    /// The URL of the database
    fn url(&self) -> &str;

    /// In a single atomic transaction, deletes the pending record with the given `id` and pushes `message` onto
    /// `queue`. If the record has already been deleted nothing is pushed and `false` is returned, so that a redelivered
    /// confirmation can never publish the same outcome twice. The attempt's fraud history is settled in the same
    /// transaction.
    async fn consume_pending(&self, pending_id: i64, queue: &str, message: &Value) -> Result<bool, StoreError>;

    /// Deletes a rejected attempt and settles its fraud history, but only while no transaction has claimed or captured
    /// it. Returns false, and changes nothing, if the record is gone or owned.
    async fn discard_pending(&self, gateway: &str, order_id: &str) -> Result<bool, StoreError>;

    /// Returns the pending record for the attempt, rebuilding it from unsettled fraud history if it has gone missing.
    /// `amount` and `currency` come from the processor's notification. Returns `None` when there is neither.
    async fn restore_pending(
        &self,
        gateway: &str,
        order_id: &str,
        amount: MinorUnits,
        currency: &str,
    ) -> Result<Option<PendingRecord>, StoreError>;

    /// In a single atomic transaction, removes `message` from its queue and stores it as damaged.
    async fn move_to_damaged(&self, message: &QueuedMessage, damaged: NewDamagedMessage) -> Result<i64, StoreError>;
}

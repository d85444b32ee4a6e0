use std::time::Duration;

use serde_json::Value;

use crate::{db_types::QueuedMessage, traits::StoreError};

/// A durable, named-queue message store with at-least-once delivery.
#[allow(async_fn_in_trait)]
pub trait JobQueue: Clone {
    /// Appends a message to the queue, returning its id.
    async fn push(&self, queue: &str, body: &Value) -> Result<i64, StoreError>;

    /// Leases the oldest available message on the queue for `lease`. A leased message is invisible to other consumers
    /// until it is acked or the lease runs out, after which it is delivered again.
    async fn pop(&self, queue: &str, lease: Duration) -> Result<Option<QueuedMessage>, StoreError>;

    /// Removes a message for good.
    async fn ack(&self, id: i64) -> Result<(), StoreError>;

    /// The number of messages on the queue, leased or not.
    async fn queue_length(&self, queue: &str) -> Result<u64, StoreError>;
}

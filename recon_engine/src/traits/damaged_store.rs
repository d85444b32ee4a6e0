use crate::{
    db_types::{DamagedMessage, NewDamagedMessage},
    traits::StoreError,
};

/// Messages that could not be processed.
#[allow(async_fn_in_trait)]
pub trait DamagedStore: Clone {
    async fn store_damaged(&self, message: NewDamagedMessage) -> Result<i64, StoreError>;

    async fn fetch_damaged(&self, id: i64) -> Result<Option<DamagedMessage>, StoreError>;

    /// Damaged messages whose retry date is at or before `now_ms`, oldest retry date first.
    async fn fetch_retryable(&self, now_ms: i64, limit: u32) -> Result<Vec<DamagedMessage>, StoreError>;

    /// Atomically moves a damaged message back onto its original queue, keeping its original enqueue time. Returns the
    /// new queue message id, or `None` if the damaged message no longer exists.
    async fn requeue_damaged(&self, id: i64) -> Result<Option<i64>, StoreError>;

    async fn delete_damaged(&self, id: i64) -> Result<bool, StoreError>;

    /// Number of damaged messages that originally came from `queue`.
    async fn count_damaged(&self, queue: &str) -> Result<u64, StoreError>;
}

use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewPendingRecord, PendingRecord},
    traits::StoreError,
};

/// Storage for pending payment attempts, keyed by `(gateway, order_id)`.
#[allow(async_fn_in_trait)]
pub trait PendingStore: Clone {
    /// Point lookup on the compound key. `None` is an expected outcome: the checkout flow's write may not have landed
    /// yet.
    async fn fetch_by_order_id(&self, gateway: &str, order_id: &str) -> Result<Option<PendingRecord>, StoreError>;

    /// Saves a pending record. Saving an attempt that already exists updates the donor details, amount and risk
    /// score, but never the capture state.
    async fn store_pending(&self, record: NewPendingRecord) -> Result<PendingRecord, StoreError>;

    /// Atomically reserves the attempt for a capture of `gateway_txn_id`. Succeeds only if the attempt is neither
    /// captured nor already claimed. Exactly one of any number of concurrent callers can win.
    async fn try_claim_capture(&self, gateway: &str, order_id: &str, gateway_txn_id: &str)
        -> Result<bool, StoreError>;

    /// Records a successful capture. Only the holder of the claim can do this.
    async fn mark_captured(&self, gateway: &str, order_id: &str, gateway_txn_id: &str) -> Result<bool, StoreError>;

    /// Gives up a claim after a capture that definitely did not happen.
    async fn release_capture_claim(
        &self,
        gateway: &str,
        order_id: &str,
        gateway_txn_id: &str,
    ) -> Result<bool, StoreError>;

    /// Stores the token for charging the donor again, and the processor's contact id if it sent one. Returns false if
    /// there is no such record.
    async fn store_recurring_token(
        &self,
        gateway: &str,
        order_id: &str,
        token: &str,
        processor_contact_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Removes abandoned attempts created before `cutoff`, optionally for a single gateway. Returns the number of
    /// records removed.
    async fn delete_pending_older_than(&self, gateway: Option<&str>, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

use crate::{
    db_types::{FraudRecord, NewFraudRecord},
    traits::StoreError,
};

/// Fraud screening history, keyed by `(gateway, order_id)` like the pending records it shadows.
#[allow(async_fn_in_trait)]
pub trait FraudStore: Clone {
    /// Saves the screening result for an attempt. Screening the same attempt again replaces the earlier result.
    async fn store_fraud_record(&self, record: NewFraudRecord) -> Result<FraudRecord, StoreError>;

    async fn fetch_fraud_record(&self, gateway: &str, order_id: &str) -> Result<Option<FraudRecord>, StoreError>;
}

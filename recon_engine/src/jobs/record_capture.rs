use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    jobs::{JobContext, JobError},
    notifications::{CanonicalNotification, NotificationType},
    outcomes::{DonationMessage, DONATIONS_QUEUE},
    traits::ReconciliationDatabase,
};

/// Turns a processor's capture confirmation into a `donations` message, consuming the pending record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCapture {
    pub gateway: String,
    pub order_id: String,
    pub gateway_txn_id: String,
    pub event_date: DateTime<Utc>,
}

impl RecordCapture {
    pub const CLASS: &'static str = "RecordCapture";

    pub fn from_notification(n: &CanonicalNotification) -> Option<Self> {
        if n.event_type != NotificationType::CaptureConfirmation || !n.success {
            return None;
        }
        Some(Self {
            gateway: n.processor.clone(),
            order_id: n.order_id.clone()?,
            gateway_txn_id: n.gateway_txn_id.clone(),
            event_date: n.event_date,
        })
    }

    /// Returns true if a `donations` message was published by this run.
    pub async fn run<B, P>(&self, ctx: &JobContext<'_, B, P>) -> Result<bool, JobError>
    where B: ReconciliationDatabase {
        let txn = self.gateway_txn_id.as_str();
        let record = match ctx.db.fetch_by_order_id(&self.gateway, &self.order_id).await? {
            Some(r) => r,
            None => {
                warn!(
                    "📦️ Capture confirmation for {}/{} txn {txn}, but there is no pending record. It has probably been \
                     recorded already",
                    self.gateway, self.order_id
                );
                return Ok(false);
            },
        };
        if let Some(owner) = record.capture_owner() {
            if owner != txn {
                warn!(
                    "📦️ Capture confirmation for {}/{} txn {txn}, but the attempt belongs to txn {owner}. Not recording \
                     it",
                    self.gateway, self.order_id
                );
                return Ok(false);
            }
        }
        if record.recurring && record.recurring_token.is_none() {
            return Err(JobError::Transient(format!(
                "Recurring attempt {}/{} has no recurring token yet",
                self.gateway, self.order_id
            )));
        }
        let message = DonationMessage::from_pending(&record, txn, self.event_date);
        let body = serde_json::to_value(&message).map_err(|e| JobError::Permanent(e.to_string()))?;
        let published = ctx.db.consume_pending(record.id, DONATIONS_QUEUE, &body).await?;
        if published {
            info!("📦️ Donation {}/{} txn {txn} recorded", self.gateway, self.order_id);
        } else {
            debug!("📦️ Donation {}/{} txn {txn} was recorded by someone else first", self.gateway, self.order_id);
        }
        Ok(published)
    }
}

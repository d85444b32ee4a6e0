use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    jobs::{JobContext, JobError},
    notifications::{CanonicalNotification, NotificationType},
    outcomes::{DonationMessage, DONATIONS_QUEUE},
    traits::ReconciliationDatabase,
};

/// Payment methods that are never captured by us. Their recurring contract is the last notification we get, so it is
/// what publishes the donation.
const CONTRACT_COMPLETES_DONATION: [&str; 2] = ["ideal", "sepadirectdebit"];

/// Attaches the token the processor stored for a recurring donation to the donor's payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringContract {
    pub gateway: String,
    pub order_id: String,
    /// The authorization the contract was set up on.
    pub gateway_txn_id: String,
    pub recurring_payment_token: String,
    #[serde(default)]
    pub processor_contact_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub event_date: DateTime<Utc>,
}

impl RecurringContract {
    pub const CLASS: &'static str = "RecurringContract";

    pub fn from_notification(n: &CanonicalNotification) -> Option<Self> {
        if n.event_type != NotificationType::RecurringContract || !n.success {
            return None;
        }
        let order_id = n.order_id.clone()?;
        Some(Self {
            gateway: n.processor.clone(),
            gateway_txn_id: n.parent_txn_id.clone().unwrap_or_else(|| n.gateway_txn_id.clone()),
            recurring_payment_token: n.subscr_id.clone().unwrap_or_else(|| n.gateway_txn_id.clone()),
            processor_contact_id: Some(order_id.clone()),
            order_id,
            payment_method: n.payment_method.clone(),
            event_date: n.event_date,
        })
    }

    fn completes_donation(&self) -> bool {
        self.payment_method.as_deref().is_some_and(|m| CONTRACT_COMPLETES_DONATION.contains(&m))
    }

    /// Returns true if the token was stored on the pending record, or published with the donation.
    pub async fn run<B, P>(&self, ctx: &JobContext<'_, B, P>) -> Result<bool, JobError>
    where B: ReconciliationDatabase {
        let token = self.recurring_payment_token.as_str();
        let contact = self.processor_contact_id.as_deref();
        if !self.completes_donation() {
            let stored = ctx.db.store_recurring_token(&self.gateway, &self.order_id, token, contact).await?;
            if stored {
                info!("🔁️ Recurring token {token} stored on {}/{}", self.gateway, self.order_id);
            } else {
                info!(
                    "🔁️ Discarding recurring contract {token} for {}/{}. There is no pending record",
                    self.gateway, self.order_id
                );
            }
            return Ok(stored);
        }
        let record = match ctx.db.fetch_by_order_id(&self.gateway, &self.order_id).await? {
            Some(r) => r,
            None => {
                warn!(
                    "🔁️ Recurring contract {token} for {}/{}, but there are no donor details to go with it",
                    self.gateway, self.order_id
                );
                return Ok(false);
            },
        };
        let txn = record.gateway_txn_id.clone().unwrap_or_else(|| self.gateway_txn_id.clone());
        let mut message = DonationMessage::from_pending(&record, &txn, self.event_date);
        message.recurring_payment_token = Some(token.to_string());
        message.processor_contact_id = self.processor_contact_id.clone().or(message.processor_contact_id);
        let body = serde_json::to_value(&message).map_err(|e| JobError::Permanent(e.to_string()))?;
        let published = ctx.db.consume_pending(record.id, DONATIONS_QUEUE, &body).await?;
        if published {
            info!("🔁️ Recurring donation {}/{} txn {txn} recorded with token {token}", self.gateway, self.order_id);
        }
        Ok(published)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn built_from_successful_contracts_only() {
        let mut n = CanonicalNotification::new("adyen", NotificationType::RecurringContract, "c-1", true)
            .with_order_id("1001.1")
            .with_parent_txn_id("t-1")
            .with_payment_method("ideal");
        n.subscr_id = Some("tok-1".into());
        let job = RecurringContract::from_notification(&n).unwrap();
        assert_eq!(job.gateway_txn_id, "t-1");
        assert_eq!(job.recurring_payment_token, "tok-1");
        assert_eq!(job.processor_contact_id.as_deref(), Some("1001.1"));
        assert!(job.completes_donation());

        n.subscr_id = None;
        n.payment_method = Some("visa".into());
        let job = RecurringContract::from_notification(&n).unwrap();
        assert_eq!(job.recurring_payment_token, "c-1");
        assert!(!job.completes_donation());

        n.success = false;
        assert!(RecurringContract::from_notification(&n).is_none());
        let no_order = CanonicalNotification::new("adyen", NotificationType::RecurringContract, "c-1", true);
        assert!(RecurringContract::from_notification(&no_order).is_none());
    }
}

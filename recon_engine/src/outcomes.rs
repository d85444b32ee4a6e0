//! Messages published on the outcome queues that downstream accounting and CRM systems consume.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{DonorDetails, PendingRecord},
    notifications::{CanonicalNotification, NotificationType, RecurringTxnType},
    risk::{RiskAssessment, ValidationAction},
};

pub const DONATIONS_QUEUE: &str = "donations";
pub const REFUND_QUEUE: &str = "refund";
pub const RECURRING_QUEUE: &str = "recurring";
pub const ANTIFRAUD_QUEUE: &str = "payments-antifraud";

//--------------------------------------     Donations       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationMessage {
    #[serde(flatten)]
    pub donor: DonorDetails,
    pub gateway: String,
    pub order_id: String,
    pub gateway_txn_id: String,
    /// Decimal amount, taken from the pending record rather than the processor's notification.
    pub gross: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_payment_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_contact_id: Option<String>,
    /// Unix timestamp of the capture event
    pub date: i64,
}

impl DonationMessage {
    pub fn from_pending(record: &PendingRecord, gateway_txn_id: &str, date: DateTime<Utc>) -> Self {
        Self {
            donor: record.donor.clone(),
            gateway: record.gateway.clone(),
            order_id: record.order_id.clone(),
            gateway_txn_id: gateway_txn_id.to_string(),
            gross: record.amount.to_decimal_string(&record.currency),
            currency: record.currency.clone(),
            payment_method: record.payment_method.clone(),
            recurring_payment_token: record.recurring_token.clone(),
            processor_contact_id: record.processor_contact_id.clone(),
            date: date.timestamp(),
        }
    }
}

//--------------------------------------     Refunds       ------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundType {
    Refund,
    Chargeback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundMessage {
    pub gateway_refund_id: String,
    pub gateway_parent_id: String,
    pub gross: Option<String>,
    pub gross_currency: Option<String>,
    #[serde(rename = "type")]
    pub refund_type: RefundType,
    pub date: i64,
    pub gateway: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RefundMessage {
    /// Returns `None` if the notification is not a refund or chargeback.
    pub fn from_notification(n: &CanonicalNotification) -> Option<Self> {
        let refund_type = match n.event_type {
            NotificationType::Refund => RefundType::Refund,
            NotificationType::Chargeback => RefundType::Chargeback,
            _ => return None,
        };
        let gross = match (n.amount, n.currency.as_deref()) {
            (Some(amount), Some(currency)) => Some(amount.to_decimal_string(currency)),
            _ => None,
        };
        Some(Self {
            gateway_refund_id: n.gateway_txn_id.clone(),
            // Some processors omit the parent on partial refunds, in which case the refund id is the best we've got
            gateway_parent_id: n.parent_txn_id.clone().unwrap_or_else(|| n.gateway_txn_id.clone()),
            gross,
            gross_currency: n.currency.clone(),
            refund_type,
            date: n.event_date.timestamp(),
            gateway: n.processor.clone(),
            order_id: n.order_id.clone(),
            payment_method: n.payment_method.clone(),
            reason: n.reason.clone(),
        })
    }
}

//--------------------------------------     Recurring       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringMessage {
    pub subscr_id: String,
    pub txn_type: RecurringTxnType,
    pub date: i64,
    pub gateway: String,
    pub gateway_txn_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl RecurringMessage {
    pub fn from_notification(n: &CanonicalNotification) -> Option<Self> {
        let txn_type = match n.event_type {
            NotificationType::Recurring(t) => t,
            _ => return None,
        };
        let gross = match (n.amount, n.currency.as_deref()) {
            (Some(amount), Some(currency)) => Some(amount.to_decimal_string(currency)),
            _ => None,
        };
        Some(Self {
            subscr_id: n.subscr_id.clone().unwrap_or_else(|| n.gateway_txn_id.clone()),
            txn_type,
            date: n.event_date.timestamp(),
            gateway: n.processor.clone(),
            gateway_txn_id: n.gateway_txn_id.clone(),
            order_id: n.order_id.clone(),
            gross,
            currency: n.currency.clone(),
        })
    }
}

//--------------------------------------     Antifraud       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntifraudMessage {
    pub risk_score: f64,
    pub score_breakdown: BTreeMap<String, f64>,
    pub validation_action: ValidationAction,
    pub gateway: String,
    pub order_id: String,
    pub gateway_txn_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution_tracking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub date: i64,
}

impl AntifraudMessage {
    pub fn new(
        record: &PendingRecord,
        gateway_txn_id: &str,
        assessment: &RiskAssessment,
        action: ValidationAction,
    ) -> Self {
        Self {
            risk_score: assessment.risk_score,
            score_breakdown: assessment.score_breakdown.clone(),
            validation_action: action,
            gateway: record.gateway.clone(),
            order_id: record.order_id.clone(),
            gateway_txn_id: gateway_txn_id.to_string(),
            contribution_tracking_id: record.donor.contribution_tracking_id.clone(),
            payment_method: record.payment_method.clone(),
            date: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod test {
    use recon_common::MinorUnits;
    use serde_json::json;

    use super::*;

    #[test]
    fn refund_parent_falls_back_to_own_id() {
        let n = CanonicalNotification::new("adyen", NotificationType::Refund, "r-1", true)
            .with_amount(MinorUnits::from(250), "GBP");
        let msg = RefundMessage::from_notification(&n).unwrap();
        assert_eq!(msg.gateway_parent_id, "r-1");
        assert_eq!(msg.gross.as_deref(), Some("2.50"));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "refund");
        assert_eq!(v["gross_currency"], "GBP");

        let cb = CanonicalNotification::new("adyen", NotificationType::Chargeback, "c-1", true).with_parent_txn_id("t-1");
        let msg = RefundMessage::from_notification(&cb).unwrap();
        assert_eq!(msg.gateway_parent_id, "t-1");
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "chargeback");

        let auth = CanonicalNotification::new("adyen", NotificationType::Authorization, "t-1", true);
        assert!(RefundMessage::from_notification(&auth).is_none());
    }

    #[test]
    fn recurring_message_shape() {
        let mut n =
            CanonicalNotification::new("paypal", NotificationType::Recurring(RecurringTxnType::SubscrPayment), "p-1", true);
        n.subscr_id = Some("S-99".into());
        let v = serde_json::to_value(RecurringMessage::from_notification(&n).unwrap()).unwrap();
        assert_eq!(v["subscr_id"], "S-99");
        assert_eq!(v["txn_type"], "subscr_payment");
        assert!(v.get("gross").is_none());
    }

    #[test]
    fn antifraud_message_shape() {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("cvv".to_string(), 20.0);
        breakdown.insert("avs".to_string(), 5.0);
        let assessment = RiskAssessment::new(10.0, breakdown);
        let record = PendingRecord {
            id: 1,
            gateway: "x".into(),
            order_id: "555-1".into(),
            gateway_txn_id: None,
            captured: false,
            capture_claim: None,
            risk_score: 10.0,
            amount: MinorUnits::from(100),
            currency: "USD".into(),
            payment_method: None,
            recurring: false,
            recurring_token: None,
            processor_contact_id: None,
            donor: DonorDetails::default(),
            date: Utc::now(),
        };
        let msg = AntifraudMessage::new(&record, "t-1", &assessment, ValidationAction::Review);
        let v = serde_json::to_value(msg).unwrap();
        assert_eq!(v["score_breakdown"], json!({"avs": 5.0, "cvv": 20.0}));
        assert_eq!(v["validation_action"], "review");
        assert_eq!(v["risk_score"], 35.0);
    }
}

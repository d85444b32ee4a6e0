//! Records persisted by the reconciliation backends.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use recon_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

//--------------------------------------     DonorDetails       -------------------------------------------------------
/// Contact details captured on the front end when the donor started the payment attempt. Fields we don't model
/// explicitly are kept in `extra` and passed through to the `donations` queue untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution_tracking_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DonorDetails {
    pub fn new<S: Into<String>>(first_name: S, last_name: S, email: S) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            email: Some(email.into()),
            ..Default::default()
        }
    }
}

//--------------------------------------     PendingRecord       ------------------------------------------------------
/// A payment attempt that was started by a donor but has not been finalised by the processor yet.
///
/// The `(gateway, order_id)` pair is unique while the record exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: i64,
    pub gateway: String,
    pub order_id: String,
    pub gateway_txn_id: Option<String>,
    pub captured: bool,
    /// The transaction id of a capture call that is currently in flight (or whose outcome is unknown).
    pub capture_claim: Option<String>,
    pub risk_score: f64,
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: Option<String>,
    pub recurring: bool,
    pub recurring_token: Option<String>,
    /// The processor's id for the donor's stored payment details. Only set by a recurring contract confirmation.
    pub processor_contact_id: Option<String>,
    pub donor: DonorDetails,
    pub date: DateTime<Utc>,
}

impl PendingRecord {
    /// The transaction that owns this attempt, if any. A successful capture owns it, and so does a capture that is in
    /// flight, since another worker must not start a second one.
    pub fn capture_owner(&self) -> Option<&str> {
        if self.captured {
            self.gateway_txn_id.as_deref()
        } else {
            self.capture_claim.as_deref()
        }
    }

    pub fn is_owned(&self) -> bool {
        self.captured || self.capture_claim.is_some()
    }
}

impl Display for PendingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}/{} {} {} captured: {} txn: {}",
            self.id,
            self.gateway,
            self.order_id,
            self.amount.to_decimal_string(&self.currency),
            self.currency,
            self.captured,
            self.gateway_txn_id.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid pending record. {0}")]
pub struct PendingRecordValidationError(pub String);

/// A pending record as written by the checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPendingRecord {
    pub gateway: String,
    pub order_id: String,
    #[serde(default)]
    pub risk_score: f64,
    pub amount: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub recurring_token: Option<String>,
    #[serde(default)]
    pub donor: DonorDetails,
    pub date: DateTime<Utc>,
}

impl NewPendingRecord {
    pub fn new<S: Into<String>>(gateway: S, order_id: S, amount: MinorUnits, currency: S) -> Self {
        Self {
            gateway: gateway.into(),
            order_id: order_id.into(),
            risk_score: 0.0,
            amount,
            currency: currency.into(),
            payment_method: None,
            recurring: false,
            recurring_token: None,
            donor: DonorDetails::default(),
            date: Utc::now(),
        }
    }

    pub fn with_risk_score(mut self, risk_score: f64) -> Self {
        self.risk_score = risk_score;
        self
    }

    pub fn with_donor(mut self, donor: DonorDetails) -> Self {
        self.donor = donor;
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_recurring(mut self, token: Option<String>) -> Self {
        self.recurring = true;
        self.recurring_token = token;
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn validate(&self) -> Result<(), PendingRecordValidationError> {
        if self.gateway.trim().is_empty() {
            return Err(PendingRecordValidationError("gateway is required".into()));
        }
        if self.order_id.trim().is_empty() {
            return Err(PendingRecordValidationError("order_id is required".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(PendingRecordValidationError("currency is required".into()));
        }
        if !self.risk_score.is_finite() {
            return Err(PendingRecordValidationError(format!("risk_score {} is not a number", self.risk_score)));
        }
        Ok(())
    }
}

//--------------------------------------     FraudRecord       ---------------------------------------------------------
/// The fraud screening result for a payment attempt, written by the checkout flow alongside the pending record.
///
/// Unlike the pending record it is kept after the attempt is finalised, which is when it becomes `settled`. An
/// unsettled row is enough to rebuild a pending record whose original has gone missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRecord {
    pub id: i64,
    pub gateway: String,
    pub order_id: String,
    pub contribution_tracking_id: Option<String>,
    pub payment_method: Option<String>,
    pub risk_score: f64,
    pub date: DateTime<Utc>,
    pub settled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFraudRecord {
    pub gateway: String,
    pub order_id: String,
    #[serde(default)]
    pub contribution_tracking_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub risk_score: f64,
    pub date: DateTime<Utc>,
}

impl NewFraudRecord {
    pub fn new<S: Into<String>>(gateway: S, order_id: S, risk_score: f64) -> Self {
        Self {
            gateway: gateway.into(),
            order_id: order_id.into(),
            contribution_tracking_id: None,
            payment_method: None,
            risk_score,
            date: Utc::now(),
        }
    }

    pub fn with_contribution_tracking_id<S: Into<String>>(mut self, id: S) -> Self {
        self.contribution_tracking_id = Some(id.into());
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = Some(method.into());
        self
    }
}

//--------------------------------------     QueuedMessage       ------------------------------------------------------
/// A message leased from a durable queue. Until it is acked it will be redelivered once the lease expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: i64,
    pub queue: String,
    pub body: Value,
    /// When the message was first enqueued. Requeued messages keep their original value.
    pub enqueued_at_ms: i64,
    pub attempts: i64,
    pub claimed_until_ms: Option<i64>,
}

//--------------------------------------     DamagedMessage       -----------------------------------------------------
/// A message that could not be processed. If `retry_at_ms` is set it will be put back on `original_queue` once that
/// time has passed, otherwise it waits for an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamagedMessage {
    pub id: i64,
    pub original_queue: String,
    pub body: Value,
    pub error: String,
    pub retry_at_ms: Option<i64>,
    pub enqueued_at_ms: i64,
    pub damaged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDamagedMessage {
    pub original_queue: String,
    pub body: Value,
    pub error: String,
    pub retry_at_ms: Option<i64>,
    pub enqueued_at_ms: i64,
}

impl NewDamagedMessage {
    pub fn new<S: Into<String>>(original_queue: S, body: Value, error: S, enqueued_at_ms: i64) -> Self {
        Self { original_queue: original_queue.into(), body, error: error.into(), retry_at_ms: None, enqueued_at_ms }
    }

    pub fn retry_at(mut self, retry_at_ms: i64) -> Self {
        self.retry_at_ms = Some(retry_at_ms);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn donor_details_round_trip_extra_fields() {
        let json = r#"{"first_name":"Ada","email":"ada@example.org","utm_source":"banner","opt_in":true}"#;
        let donor: DonorDetails = serde_json::from_str(json).unwrap();
        assert_eq!(donor.first_name.as_deref(), Some("Ada"));
        assert_eq!(donor.extra["utm_source"], "banner");
        let back = serde_json::to_value(&donor).unwrap();
        assert_eq!(back["opt_in"], true);
        assert!(back.get("last_name").is_none());
    }

    #[test]
    fn validation() {
        let rec = NewPendingRecord::new("adyen", "123.1", MinorUnits::from(500), "USD");
        assert!(rec.validate().is_ok());
        let mut bad = rec.clone();
        bad.order_id = " ".into();
        assert_eq!(bad.validate().unwrap_err().to_string(), "Invalid pending record. order_id is required");
        let mut bad = rec;
        bad.risk_score = f64::NAN;
        assert!(bad.validate().is_err());
    }
}

//! Processor payload decoders.
//!
//! A decoder turns the raw body of one webhook delivery into canonical notifications. Each item is decoded on its own,
//! so a malformed item yields an `Err` in its slot without affecting its siblings. Only an envelope that can't be read
//! at all fails the whole delivery.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::*;
use recon_common::MinorUnits;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{CanonicalNotification, NotificationType};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No decoder is registered under the name '{0}'")]
    UnknownDecoder(String),
    #[error("The delivery envelope could not be read. {0}")]
    Envelope(String),
    #[error("Notification #{index} is malformed. {reason}")]
    Malformed { index: usize, reason: String },
}

pub type DecodeResult = Result<Vec<Result<CanonicalNotification, DecodeError>>, DecodeError>;

/// Decodes a delivery for the named processor.
pub type Decoder = fn(&str, &[u8]) -> DecodeResult;

#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Decoder>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DecoderRegistry {
    pub fn empty() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// A registry with the `canonical` and `adyen` decoders.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("canonical", canonical_decoder);
        registry.register("adyen", adyen_decoder);
        registry
    }

    pub fn register<S: Into<String>>(&mut self, name: S, decoder: Decoder) {
        self.decoders.insert(name.into(), decoder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Decode `body` with the decoder called `decoder`, attributing the notifications to `processor`.
    pub fn decode(&self, decoder: &str, processor: &str, body: &[u8]) -> DecodeResult {
        let f = self.decoders.get(decoder).ok_or_else(|| DecodeError::UnknownDecoder(decoder.to_string()))?;
        f(processor, body)
    }
}

fn parse_envelope(body: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice::<Value>(body).map_err(|e| DecodeError::Envelope(e.to_string()))
}

fn malformed<E: ToString>(index: usize, e: E) -> DecodeError {
    DecodeError::Malformed { index, reason: e.to_string() }
}

//--------------------------------------     Canonical       ----------------------------------------------------------
#[derive(Debug, Deserialize)]
struct CanonicalItem {
    event_type: String,
    gateway_txn_id: String,
    #[serde(default)]
    parent_txn_id: Option<String>,
    #[serde(default)]
    order_id: Option<String>,
    /// Decimal amount in major units, e.g. "10.50"
    #[serde(default)]
    amount: Option<String>,
    /// Integer amount in minor units. Takes precedence over `amount`.
    #[serde(default)]
    amount_minor: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    success: bool,
    #[serde(default)]
    event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    cvv_result: Option<String>,
    #[serde(default)]
    avs_result: Option<String>,
    #[serde(default)]
    subscr_id: Option<String>,
    #[serde(default)]
    txn_type: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Decodes a processor-neutral JSON payload: a single notification object, an array of them, or an object with a
/// `notifications` array.
pub fn canonical_decoder(processor: &str, body: &[u8]) -> DecodeResult {
    let items = match parse_envelope(body)? {
        Value::Array(items) => items,
        Value::Object(mut obj) if obj.contains_key("notifications") => match obj.remove("notifications") {
            Some(Value::Array(items)) => items,
            _ => return Err(DecodeError::Envelope("'notifications' must be an array".into())),
        },
        v @ Value::Object(_) => vec![v],
        _ => return Err(DecodeError::Envelope("Expected a JSON object or array".into())),
    };
    let result = items.into_iter().enumerate().map(|(i, v)| canonical_item(processor, i, v)).collect();
    Ok(result)
}

fn canonical_item(processor: &str, index: usize, value: Value) -> Result<CanonicalNotification, DecodeError> {
    let item = serde_json::from_value::<CanonicalItem>(value).map_err(|e| malformed(index, e))?;
    if item.gateway_txn_id.trim().is_empty() {
        return Err(DecodeError::Malformed { index, reason: "gateway_txn_id is empty".into() });
    }
    let amount = match (item.amount_minor, item.amount.as_deref(), item.currency.as_deref()) {
        (Some(minor), _, _) => Some(MinorUnits::from(minor)),
        (None, Some(amount), Some(currency)) => {
            Some(MinorUnits::from_decimal_str(amount, currency).map_err(|e| malformed(index, e))?)
        },
        (None, Some(_), None) => {
            return Err(DecodeError::Malformed { index, reason: "amount given without a currency".into() })
        },
        (None, None, _) => None,
    };
    let event_type = NotificationType::from_event_name(&item.event_type, item.txn_type.as_deref());
    let mut n = CanonicalNotification::new(processor.to_string(), event_type, item.gateway_txn_id, item.success);
    n.parent_txn_id = item.parent_txn_id;
    n.order_id = item.order_id;
    n.amount = amount;
    n.currency = item.currency.map(|c| c.to_ascii_uppercase());
    n.event_date = item.event_date.unwrap_or_else(Utc::now);
    n.payment_method = item.payment_method;
    n.cvv_result = item.cvv_result;
    n.avs_result = item.avs_result;
    n.subscr_id = item.subscr_id;
    n.reason = item.reason;
    n.metadata = item.metadata;
    Ok(n)
}

//--------------------------------------     Adyen       --------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct AdyenEnvelope {
    #[serde(rename = "notificationItems")]
    notification_items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdyenItem {
    event_code: String,
    psp_reference: String,
    #[serde(default)]
    original_reference: Option<String>,
    #[serde(default)]
    merchant_reference: Option<String>,
    #[serde(default)]
    amount: Option<AdyenAmount>,
    success: String,
    #[serde(default)]
    event_date: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    additional_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AdyenAmount {
    value: i64,
    currency: String,
}

/// Decodes an Adyen-style batch: `{"notificationItems": [{"NotificationRequestItem": {...}}, ...]}`. Amounts are
/// already in minor units.
pub fn adyen_decoder(processor: &str, body: &[u8]) -> DecodeResult {
    let envelope =
        serde_json::from_value::<AdyenEnvelope>(parse_envelope(body)?).map_err(|e| DecodeError::Envelope(e.to_string()))?;
    let result = envelope
        .notification_items
        .into_iter()
        .enumerate()
        .map(|(i, mut v)| {
            let item = v
                .get_mut("NotificationRequestItem")
                .map(Value::take)
                .ok_or_else(|| DecodeError::Malformed { index: i, reason: "missing NotificationRequestItem".into() })?;
            adyen_item(processor, i, item)
        })
        .collect();
    Ok(result)
}

fn adyen_item(processor: &str, index: usize, value: Value) -> Result<CanonicalNotification, DecodeError> {
    let item = serde_json::from_value::<AdyenItem>(value).map_err(|e| malformed(index, e))?;
    let success = item.success.eq_ignore_ascii_case("true");
    let event_type = match item.event_code.as_str() {
        "AUTHORISATION" => NotificationType::Authorization,
        "CAPTURE" | "CAPTURE_FAILED" => NotificationType::CaptureConfirmation,
        "REFUND" => NotificationType::Refund,
        "CHARGEBACK" => NotificationType::Chargeback,
        "REPORT_AVAILABLE" => NotificationType::ReportReady,
        "RECURRING_CONTRACT" => NotificationType::RecurringContract,
        other => NotificationType::Unknown(other.to_string()),
    };
    // CAPTURE_FAILED arrives with success=true, but it reports a failure
    let success = success && item.event_code != "CAPTURE_FAILED";
    let mut n = CanonicalNotification::new(processor.to_string(), event_type, item.psp_reference.clone(), success);
    n.parent_txn_id = item.original_reference;
    n.order_id = item.merchant_reference;
    if let Some(amount) = item.amount {
        n.amount = Some(MinorUnits::from(amount.value));
        n.currency = Some(amount.currency.to_ascii_uppercase());
    }
    n.event_date = match item.event_date.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(d)) => d.with_timezone(&Utc),
        Some(Err(e)) => {
            debug!("📬️ Unparseable eventDate on {}. Using the current time. {e}", item.psp_reference);
            Utc::now()
        },
        None => Utc::now(),
    };
    n.payment_method = item.payment_method;
    n.reason = item.reason;
    let text = |key: &str| item.additional_data.get(key).and_then(Value::as_str).map(String::from);
    n.cvv_result = text("cvcResult");
    n.avs_result = text("avsResult");
    if matches!(n.event_type, NotificationType::Recurring(_) | NotificationType::RecurringContract) {
        n.subscr_id = text("recurring.recurringDetailReference").or_else(|| Some(item.psp_reference.clone()));
    }
    n.metadata = item.additional_data;
    Ok(n)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notifications::{ActionKind, RecurringTxnType};

    #[test]
    fn canonical_single_and_batch() {
        let registry = DecoderRegistry::with_defaults();
        let single = br#"{"event_type":"authorization","gateway_txn_id":"t1","order_id":"555-1","amount":"10.50",
            "currency":"usd","success":true,"cvv_result":"M","avs_result":"Y"}"#;
        let n = registry.decode("canonical", "x", single).unwrap();
        assert_eq!(n.len(), 1);
        let n = n[0].as_ref().unwrap();
        assert_eq!(n.processor, "x");
        assert_eq!(n.event_type, NotificationType::Authorization);
        assert_eq!(n.amount, Some(MinorUnits::from(1050)));
        assert_eq!(n.currency.as_deref(), Some("USD"));
        assert_eq!(n.cvv_result.as_deref(), Some("M"));

        let batch = br#"{"notifications":[
            {"event_type":"refund","gateway_txn_id":"r1","parent_txn_id":"t1","amount_minor":1050,"currency":"USD","success":true},
            {"event_type":"refund","success":true},
            {"event_type":"capture","gateway_txn_id":"t2","amount":"1.999","currency":"USD","success":true},
            {"event_type":"recurring","txn_type":"subscr_cancel","gateway_txn_id":"s1","subscr_id":"sub-9","success":true}
        ]}"#;
        let n = registry.decode("canonical", "x", batch).unwrap();
        assert_eq!(n.len(), 4);
        assert!(n[0].is_ok());
        assert!(matches!(n[1], Err(DecodeError::Malformed { index: 1, .. })));
        assert!(matches!(n[2], Err(DecodeError::Malformed { index: 2, .. })));
        let rec = n[3].as_ref().unwrap();
        assert_eq!(rec.event_type, NotificationType::Recurring(RecurringTxnType::SubscrCancel));
        assert_eq!(rec.subscr_id.as_deref(), Some("sub-9"));
    }

    #[test]
    fn bad_envelopes() {
        let registry = DecoderRegistry::with_defaults();
        assert!(matches!(registry.decode("canonical", "x", b"not json"), Err(DecodeError::Envelope(_))));
        assert!(matches!(registry.decode("canonical", "x", b"42"), Err(DecodeError::Envelope(_))));
        assert!(matches!(registry.decode("adyen", "x", b"{}"), Err(DecodeError::Envelope(_))));
        assert_eq!(registry.decode("paypal", "x", b"{}").unwrap_err(), DecodeError::UnknownDecoder("paypal".into()));
    }

    #[test]
    fn adyen_batch() {
        let body = br#"{"live":"false","notificationItems":[
            {"NotificationRequestItem":{"eventCode":"AUTHORISATION","pspReference":"8815","merchantReference":"123.1",
                "amount":{"value":1000,"currency":"EUR"},"success":"true","eventDate":"2024-03-01T10:00:00+01:00",
                "paymentMethod":"visa","additionalData":{"cvcResult":"1 Matches","avsResult":"4 AVS not supported"}}},
            {"NotificationRequestItem":{"eventCode":"CHARGEBACK","pspReference":"9915","originalReference":"8815",
                "merchantReference":"123.1","amount":{"value":1000,"currency":"EUR"},"success":"true","reason":"fraud"}},
            {"Bogus":{}},
            {"NotificationRequestItem":{"eventCode":"CAPTURE_FAILED","pspReference":"7715","success":"true"}},
            {"NotificationRequestItem":{"eventCode":"OFFER_CLOSED","pspReference":"6615","success":"true"}}
        ]}"#;
        let n = adyen_decoder("adyen", body).unwrap();
        assert_eq!(n.len(), 5);
        let auth = n[0].as_ref().unwrap();
        assert_eq!(auth.event_type, NotificationType::Authorization);
        assert_eq!(auth.amount, Some(MinorUnits::from(1000)));
        assert_eq!(auth.order_id.as_deref(), Some("123.1"));
        assert_eq!(auth.cvv_result.as_deref(), Some("1 Matches"));
        assert_eq!(auth.event_date.to_rfc3339(), "2024-03-01T09:00:00+00:00");
        let cb = n[1].as_ref().unwrap();
        assert_eq!(cb.event_type, NotificationType::Chargeback);
        assert_eq!(cb.parent_txn_id.as_deref(), Some("8815"));
        assert!(n[2].is_err());
        let failed = n[3].as_ref().unwrap();
        assert_eq!(failed.event_type, NotificationType::CaptureConfirmation);
        assert!(!failed.success);
        assert!(matches!(n[4].as_ref().unwrap().event_type, NotificationType::Unknown(_)));
    }

    #[test]
    fn adyen_recurring_contract() {
        let body = br#"{"live":"false","notificationItems":[
            {"NotificationRequestItem":{"eventCode":"RECURRING_CONTRACT","pspReference":"4415","originalReference":"8815",
                "merchantReference":"123.1","success":"true","paymentMethod":"visa",
                "additionalData":{"recurring.recurringDetailReference":"DETAIL-1"}}},
            {"NotificationRequestItem":{"eventCode":"RECURRING_CONTRACT","pspReference":"4416","originalReference":"8816",
                "merchantReference":"124.1","success":"true","paymentMethod":"ideal"}}
        ]}"#;
        let n = adyen_decoder("adyen", body).unwrap();
        let card = n[0].as_ref().unwrap();
        assert_eq!(card.event_type, NotificationType::RecurringContract);
        assert_eq!(card.action_kind(), Some(ActionKind::RecordRecurringContract));
        assert_eq!(card.subscr_id.as_deref(), Some("DETAIL-1"));
        assert_eq!(card.parent_txn_id.as_deref(), Some("8815"));
        let ideal = n[1].as_ref().unwrap();
        assert_eq!(ideal.subscr_id.as_deref(), Some("4416"));
        assert_eq!(ideal.payment_method.as_deref(), Some("ideal"));
    }
}

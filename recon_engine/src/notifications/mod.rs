//! # Canonical notifications
//!
//! Every processor webhook delivery is decoded into zero or more [`CanonicalNotification`]s. From this point on the
//! pipeline never looks at which processor sent a notification, only at its [`NotificationType`] and success flag.
//!
//! Decoders for specific processor payloads live in [`decoders`] and are looked up by name in a [`DecoderRegistry`].
mod decoders;

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use recon_common::MinorUnits;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use decoders::{adyen_decoder, canonical_decoder, DecodeError, DecodeResult, Decoder, DecoderRegistry};

use crate::{
    context::ProcessorContext,
    outcomes::{RECURRING_QUEUE, REFUND_QUEUE},
};

//--------------------------------------     RecurringTxnType       ---------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringTxnType {
    SubscrSignup,
    SubscrPayment,
    SubscrCancel,
    SubscrFailed,
    SubscrEot,
}

impl Display for RecurringTxnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SubscrSignup => "subscr_signup",
            Self::SubscrPayment => "subscr_payment",
            Self::SubscrCancel => "subscr_cancel",
            Self::SubscrFailed => "subscr_failed",
            Self::SubscrEot => "subscr_eot",
        };
        f.write_str(s)
    }
}

impl FromStr for RecurringTxnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscr_signup" => Ok(Self::SubscrSignup),
            "subscr_payment" => Ok(Self::SubscrPayment),
            "subscr_cancel" => Ok(Self::SubscrCancel),
            "subscr_failed" => Ok(Self::SubscrFailed),
            "subscr_eot" => Ok(Self::SubscrEot),
            _ => Err(format!("Unknown recurring transaction type: {s}")),
        }
    }
}

//--------------------------------------     NotificationType       ---------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationType {
    Authorization,
    CaptureConfirmation,
    Refund,
    Chargeback,
    Recurring(RecurringTxnType),
    /// The processor has stored the donor's payment details for future charges of a recurring donation.
    RecurringContract,
    ReportReady,
    PaymentMethodDeleted,
    /// Anything we don't recognise. These are acknowledged and ignored, so that new event types added by a processor
    /// don't break the listener.
    Unknown(String),
}

impl NotificationType {
    /// Maps the event names used in canonical payloads to a notification type. Recurring events carry their
    /// transaction type separately.
    pub fn from_event_name(name: &str, txn_type: Option<&str>) -> Self {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "authorization" | "authorisation" => Self::Authorization,
            "capture" | "capture-confirmation" => Self::CaptureConfirmation,
            "refund" => Self::Refund,
            "chargeback" => Self::Chargeback,
            "report-ready" | "report-available" => Self::ReportReady,
            "payment-method-deleted" => Self::PaymentMethodDeleted,
            "recurring-contract" => Self::RecurringContract,
            "recurring" => match txn_type.map(RecurringTxnType::from_str) {
                Some(Ok(t)) => Self::Recurring(t),
                _ => Self::Unknown(format!("recurring/{}", txn_type.unwrap_or("?"))),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authorization => write!(f, "authorization"),
            Self::CaptureConfirmation => write!(f, "capture-confirmation"),
            Self::Refund => write!(f, "refund"),
            Self::Chargeback => write!(f, "chargeback"),
            Self::Recurring(t) => write!(f, "recurring/{t}"),
            Self::RecurringContract => write!(f, "recurring-contract"),
            Self::ReportReady => write!(f, "report-ready"),
            Self::PaymentMethodDeleted => write!(f, "payment-method-deleted"),
            Self::Unknown(s) => write!(f, "unknown ({s})"),
        }
    }
}

//--------------------------------------     ActionKind       ---------------------------------------------------------
/// What should happen in response to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Queue a capture-decision job for a successful authorization.
    RequestCapture,
    /// Queue a job that records a confirmed capture on the `donations` queue.
    RecordCapture,
    /// Publish a refund or chargeback on the `refund` queue.
    EmitRefund,
    /// Publish a subscription event on the `recurring` queue.
    EmitRecurring,
    /// Queue a job that attaches a confirmed recurring token to its payment attempt.
    RecordRecurringContract,
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestCapture => write!(f, "RequestCapture"),
            Self::RecordCapture => write!(f, "RecordCapture"),
            Self::EmitRefund => write!(f, "EmitRefund"),
            Self::EmitRecurring => write!(f, "EmitRecurring"),
            Self::RecordRecurringContract => write!(f, "RecordRecurringContract"),
        }
    }
}

//--------------------------------------     CanonicalNotification       ----------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalNotification {
    pub processor: String,
    pub event_type: NotificationType,
    pub gateway_txn_id: String,
    /// The original transaction, for refunds and chargebacks.
    pub parent_txn_id: Option<String>,
    pub order_id: Option<String>,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub success: bool,
    pub event_date: DateTime<Utc>,
    pub payment_method: Option<String>,
    pub cvv_result: Option<String>,
    pub avs_result: Option<String>,
    pub subscr_id: Option<String>,
    pub reason: Option<String>,
    pub metadata: Map<String, Value>,
}

impl CanonicalNotification {
    pub fn new<S: Into<String>>(processor: S, event_type: NotificationType, gateway_txn_id: S, success: bool) -> Self {
        Self {
            processor: processor.into(),
            event_type,
            gateway_txn_id: gateway_txn_id.into(),
            parent_txn_id: None,
            order_id: None,
            amount: None,
            currency: None,
            success,
            event_date: Utc::now(),
            payment_method: None,
            cvv_result: None,
            avs_result: None,
            subscr_id: None,
            reason: None,
            metadata: Map::new(),
        }
    }

    pub fn with_order_id<S: Into<String>>(mut self, order_id: S) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_amount<S: Into<String>>(mut self, amount: MinorUnits, currency: S) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_parent_txn_id<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent_txn_id = Some(parent.into());
        self
    }

    pub fn with_risk_signals(mut self, cvv_result: Option<String>, avs_result: Option<String>) -> Self {
        self.cvv_result = cvv_result;
        self.avs_result = avs_result;
        self
    }

    pub fn with_payment_method<S: Into<String>>(mut self, method: S) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_event_date(mut self, date: DateTime<Utc>) -> Self {
        self.event_date = date;
        self
    }

    /// The action this notification calls for. Failed events never produce an action, except subscription events,
    /// whose failures are themselves a subscription event (e.g. `subscr_failed`).
    pub fn action_kind(&self) -> Option<ActionKind> {
        match (&self.event_type, self.success) {
            (NotificationType::Authorization, true) => Some(ActionKind::RequestCapture),
            (NotificationType::CaptureConfirmation, true) => Some(ActionKind::RecordCapture),
            (NotificationType::Refund, true) | (NotificationType::Chargeback, true) => Some(ActionKind::EmitRefund),
            (NotificationType::Recurring(_), _) => Some(ActionKind::EmitRecurring),
            (NotificationType::RecurringContract, true) => Some(ActionKind::RecordRecurringContract),
            _ => None,
        }
    }

    /// The queue this notification's action writes to.
    pub fn destination_queue(&self, context: &ProcessorContext) -> Option<String> {
        match self.action_kind()? {
            ActionKind::RequestCapture | ActionKind::RecordCapture | ActionKind::RecordRecurringContract => {
                Some(context.jobs_queue())
            },
            ActionKind::EmitRefund => Some(REFUND_QUEUE.to_string()),
            ActionKind::EmitRecurring => Some(RECURRING_QUEUE.to_string()),
        }
    }
}

impl Display for CanonicalNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} txn {} order {} ({})",
            self.processor,
            self.event_type,
            self.gateway_txn_id,
            self.order_id.as_deref().unwrap_or("-"),
            if self.success { "success" } else { "failure" }
        )
    }
}

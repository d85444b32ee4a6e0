//! # Jobs
//!
//! A job is the unit of work that travels from the listener to a worker over a [`JobQueue`]. On the queue it is a
//! [`JobEnvelope`], `{"class": ..., "payload": {...}}`; a worker turns it back into a [`Job`] using a [`JobRegistry`]
//! keyed on `class`.
//!
//! Delivery is at-least-once, so every job must be safe to execute more than once. Jobs report failures with a
//! [`JobError`], which tells the queue runtime whether to retry ([`JobError::Transient`]), give up
//! ([`JobError::Permanent`]) or leave the matter to an operator ([`JobError::Ambiguous`]).
//!
//! [`JobQueue`]: crate::traits::JobQueue
mod process_capture;
mod record_capture;
mod recurring_contract;

use std::{collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use process_capture::ProcessCaptureRequest;
pub use record_capture::RecordCapture;
pub use recurring_contract::RecurringContract;

use crate::{
    context::ProcessorContext,
    traits::{PaymentProcessor, ReconciliationDatabase, StoreError},
};

//--------------------------------------     JobError       -----------------------------------------------------------
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The job could not complete now but may well succeed later, e.g. a correlated record has not landed yet.
    #[error("Transient job failure. {0}")]
    Transient(String),
    /// The job can never succeed as it stands.
    #[error("Permanent job failure. {0}")]
    Permanent(String),
    /// An outbound call may or may not have taken effect. Must not be retried automatically.
    #[error("Ambiguous outcome, manual reconciliation required. {0}")]
    Ambiguous(String),
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        Self::Transient(e.to_string())
    }
}

//--------------------------------------     JobEnvelope       --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub class: String,
    pub payload: Value,
}

impl JobEnvelope {
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "class": self.class, "payload": self.payload })
    }
}

//--------------------------------------     JobContext       ---------------------------------------------------------
/// Everything a job needs to run: the backend, the processor's configuration and its API client.
pub struct JobContext<'a, B, P> {
    pub db: &'a B,
    pub context: &'a ProcessorContext,
    pub processor: &'a P,
}

impl<'a, B, P> JobContext<'a, B, P> {
    pub fn new(db: &'a B, context: &'a ProcessorContext, processor: &'a P) -> Self {
        Self { db, context, processor }
    }
}

//--------------------------------------     Job       ----------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    ProcessCaptureRequest(ProcessCaptureRequest),
    RecordCapture(RecordCapture),
    RecurringContract(RecurringContract),
}

impl Job {
    pub fn class(&self) -> &'static str {
        match self {
            Self::ProcessCaptureRequest(_) => ProcessCaptureRequest::CLASS,
            Self::RecordCapture(_) => RecordCapture::CLASS,
            Self::RecurringContract(_) => RecurringContract::CLASS,
        }
    }

    /// The processor this job belongs to. Workers use it to pick the context and API client.
    pub fn gateway(&self) -> &str {
        match self {
            Self::ProcessCaptureRequest(j) => j.gateway.as_str(),
            Self::RecordCapture(j) => j.gateway.as_str(),
            Self::RecurringContract(j) => j.gateway.as_str(),
        }
    }

    pub fn to_envelope(&self) -> Result<JobEnvelope, serde_json::Error> {
        let payload = match self {
            Self::ProcessCaptureRequest(j) => serde_json::to_value(j)?,
            Self::RecordCapture(j) => serde_json::to_value(j)?,
            Self::RecurringContract(j) => serde_json::to_value(j)?,
        };
        Ok(JobEnvelope { class: self.class().to_string(), payload })
    }

    pub async fn execute<B, P>(&self, ctx: &JobContext<'_, B, P>) -> Result<(), JobError>
    where
        B: ReconciliationDatabase,
        P: PaymentProcessor,
    {
        match self {
            Self::ProcessCaptureRequest(j) => j.run(ctx).await.map(|_| ()),
            Self::RecordCapture(j) => j.run(ctx).await.map(|_| ()),
            Self::RecurringContract(j) => j.run(ctx).await.map(|_| ()),
        }
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessCaptureRequest(j) => {
                write!(f, "{} {}/{} txn {}", self.class(), j.gateway, j.order_id, j.details.gateway_txn_id)
            },
            Self::RecordCapture(j) => write!(f, "{} {}/{} txn {}", self.class(), j.gateway, j.order_id, j.gateway_txn_id),
            Self::RecurringContract(j) => {
                write!(f, "{} {}/{} token {}", self.class(), j.gateway, j.order_id, j.recurring_payment_token)
            },
        }
    }
}

//--------------------------------------     JobRegistry       --------------------------------------------------------
pub type JobFactory = fn(Value) -> Result<Job, JobError>;

/// Rebuilds jobs from their queue representation, using the job class as the key.
#[derive(Clone)]
pub struct JobRegistry {
    factories: HashMap<String, JobFactory>,
}

impl JobRegistry {
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// A registry that knows every job class in this crate.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ProcessCaptureRequest::CLASS, |payload| {
            serde_json::from_value(payload)
                .map(Job::ProcessCaptureRequest)
                .map_err(|e| JobError::Permanent(format!("Malformed {} payload. {e}", ProcessCaptureRequest::CLASS)))
        });
        registry.register(RecordCapture::CLASS, |payload| {
            serde_json::from_value(payload)
                .map(Job::RecordCapture)
                .map_err(|e| JobError::Permanent(format!("Malformed {} payload. {e}", RecordCapture::CLASS)))
        });
        registry.register(RecurringContract::CLASS, |payload| {
            serde_json::from_value(payload)
                .map(Job::RecurringContract)
                .map_err(|e| JobError::Permanent(format!("Malformed {} payload. {e}", RecurringContract::CLASS)))
        });
        registry
    }

    pub fn register(&mut self, class: &str, factory: JobFactory) {
        self.factories.insert(class.to_string(), factory);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Turns a queued message body back into a job. An unknown class or a payload that doesn't fit is a permanent
    /// failure.
    pub fn hydrate(&self, body: &Value) -> Result<Job, JobError> {
        let envelope: JobEnvelope = serde_json::from_value(body.clone())
            .map_err(|e| JobError::Permanent(format!("Message is not a job envelope. {e}")))?;
        let factory = self
            .factories
            .get(&envelope.class)
            .ok_or_else(|| JobError::Permanent(format!("No job is registered for class '{}'", envelope.class)))?;
        factory(envelope.payload)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::capture::TransactionDetails;

    #[test]
    fn envelope_shape() {
        let job = Job::RecordCapture(RecordCapture {
            gateway: "adyen".into(),
            order_id: "1001.1".into(),
            gateway_txn_id: "t1".into(),
            event_date: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        });
        let v = job.to_envelope().unwrap().to_value();
        assert_eq!(v["class"], "RecordCapture");
        assert_eq!(v["payload"]["order_id"], "1001.1");
        let hydrated = JobRegistry::with_defaults().hydrate(&v).unwrap();
        assert_eq!(hydrated, job);
        assert_eq!(hydrated.gateway(), "adyen");
    }

    #[test]
    fn hydrate_capture_request() {
        let body = json!({
            "class": "ProcessCaptureRequest",
            "payload": {
                "gateway": "adyen",
                "order_id": "1001.1",
                "details": { "gateway_txn_id": "t1", "cvv_result": "M" }
            }
        });
        let job = JobRegistry::with_defaults().hydrate(&body).unwrap();
        match job {
            Job::ProcessCaptureRequest(j) => {
                assert_eq!(j.details, TransactionDetails::new("t1").with_risk_signals(Some("M".into()), None));
                assert!(j.payment_method.is_none());
            },
            other => panic!("Unexpected job {other}"),
        }
    }

    #[test]
    fn hydrate_recurring_contract() {
        let body = json!({
            "class": "RecurringContract",
            "payload": {
                "gateway": "adyen",
                "order_id": "1001.1",
                "gateway_txn_id": "t1",
                "recurring_payment_token": "tok-1",
                "event_date": "2024-06-01T12:00:00Z"
            }
        });
        let job = JobRegistry::with_defaults().hydrate(&body).unwrap();
        assert_eq!(job.class(), "RecurringContract");
        assert_eq!(job.to_string(), "RecurringContract adyen/1001.1 token tok-1");
        match job {
            Job::RecurringContract(j) => assert!(j.processor_contact_id.is_none()),
            other => panic!("Unexpected job {other}"),
        }
    }

    #[test]
    fn unknown_class_and_bad_payloads_are_permanent() {
        let registry = JobRegistry::with_defaults();
        let err = registry.hydrate(&json!({"class": "SendPostcard", "payload": {}})).unwrap_err();
        assert!(matches!(err, JobError::Permanent(_)));
        let err = registry.hydrate(&json!({"class": "RecordCapture", "payload": {"gateway": 7}})).unwrap_err();
        assert!(matches!(err, JobError::Permanent(_)));
        let err = registry.hydrate(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, JobError::Permanent(_)));
        assert!(!JobRegistry::empty().contains("RecordCapture"));
    }

    #[test]
    fn store_errors_are_transient() {
        let e = JobError::from(StoreError::DatabaseError("locked".into()));
        assert!(matches!(e, JobError::Transient(_)));
    }
}

use recon_common::MinorUnits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub gateway_txn_id: String,
    pub order_id: String,
    pub amount: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub gateway_txn_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor answered and refused the request.
    #[error("The processor declined the request. {0}")]
    Declined(String),
    /// The request never left this process (e.g. the connection could not be established). Safe to retry.
    #[error("The request could not be sent to the processor. {0}")]
    NotSent(String),
    /// The request was sent, but no answer came back in time. It may or may not have been carried out.
    #[error("The processor did not respond in time. {0}")]
    Timeout(String),
    /// The processor answered with something we could not interpret.
    #[error("Unexpected response from the processor. {0}")]
    Protocol(String),
}

impl ProcessorError {
    /// True if the processor may have acted on the request even though we got an error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Protocol(_))
    }
}

/// The subset of a processor's API that the reconciliation core drives.
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    fn name(&self) -> &str;

    /// Captures (settles) an authorized payment.
    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResponse, ProcessorError>;

    /// Cancels (voids) an authorization.
    async fn cancel(&self, gateway_txn_id: &str) -> Result<(), ProcessorError>;
}

//! An in-memory payment processor that records what it was asked to do.
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use crate::traits::{CaptureRequest, CaptureResponse, PaymentProcessor, ProcessorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBehaviour {
    Succeed,
    Decline,
    FailToSend,
    /// Answers after the delay, which callers with a shorter timeout will experience as a timeout.
    Hang(Duration),
}

#[derive(Debug, Clone)]
pub struct RecordingProcessor {
    name: String,
    behaviour: CaptureBehaviour,
    delay: Duration,
    captures: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CaptureRequest>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
    fail_cancel: bool,
}

impl RecordingProcessor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behaviour: CaptureBehaviour::Succeed,
            delay: Duration::ZERO,
            captures: Arc::new(AtomicUsize::new(0)),
            captured: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
            fail_cancel: false,
        }
    }

    pub fn with_behaviour(mut self, behaviour: CaptureBehaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Every capture call waits this long before answering, so that concurrent calls overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// Number of capture calls made, successful or not.
    pub fn capture_calls(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// The requests that were successfully captured.
    pub fn captured(&self) -> Vec<CaptureRequest> {
        self.captured.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl PaymentProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResponse, ProcessorError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behaviour {
            CaptureBehaviour::Succeed => {
                if let Ok(mut v) = self.captured.lock() {
                    v.push(request.clone());
                }
                Ok(CaptureResponse { gateway_txn_id: request.gateway_txn_id.clone(), status: "captured".into() })
            },
            CaptureBehaviour::Decline => Err(ProcessorError::Declined("Refused".into())),
            CaptureBehaviour::FailToSend => Err(ProcessorError::NotSent("Connection refused".into())),
            CaptureBehaviour::Hang(d) => {
                tokio::time::sleep(d).await;
                Err(ProcessorError::Protocol("Answered far too late".into()))
            },
        }
    }

    async fn cancel(&self, gateway_txn_id: &str) -> Result<(), ProcessorError> {
        if self.fail_cancel {
            return Err(ProcessorError::Declined("Cannot cancel".into()));
        }
        if let Ok(mut v) = self.cancelled.lock() {
            v.push(gateway_txn_id.to_string());
        }
        Ok(())
    }
}

//! # Action dispatch
//!
//! [`ActionDispatcher::resolve`] maps a notification to the [`Action`] it calls for, purely from its event type and
//! success flag. Processor identity only matters for picking the [`ProcessorContext`].
//!
//! [`Action::execute`] turns the notification into a queue message (a job envelope, or an outcome message) and pushes
//! it. If the queue is unavailable, the message is parked in the damaged store with an immediate retry date, so that
//! the requeue sweeper picks it up as soon as the queue is back.
use std::collections::HashMap;

use log::*;
use serde_json::Value;

use crate::{
    context::ProcessorContext,
    db_types::NewDamagedMessage,
    helpers::now_ms,
    jobs::{Job, ProcessCaptureRequest, RecordCapture, RecurringContract},
    notifications::{ActionKind, CanonicalNotification},
    outcomes::{RecurringMessage, RefundMessage},
    traits::ReconciliationDatabase,
};

pub struct ActionDispatcher<B> {
    db: B,
    contexts: HashMap<String, ProcessorContext>,
}

impl<B> ActionDispatcher<B>
where B: ReconciliationDatabase
{
    pub fn new(db: B) -> Self {
        Self { db, contexts: HashMap::new() }
    }

    pub fn with_context(mut self, context: ProcessorContext) -> Self {
        self.add_context(context);
        self
    }

    pub fn add_context(&mut self, context: ProcessorContext) {
        self.contexts.insert(context.processor.clone(), context);
    }

    pub fn context(&self, processor: &str) -> Option<&ProcessorContext> {
        self.contexts.get(processor)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// The action for the notification, or `None` if there is nothing to do. Event types we don't know about resolve to
    /// `None`.
    pub fn resolve(&self, notification: &CanonicalNotification) -> Option<Action<'_, B>> {
        let kind = match notification.action_kind() {
            Some(k) => k,
            None => {
                debug!("🔀️ No action for {notification}");
                return None;
            },
        };
        let context = match self.contexts.get(&notification.processor) {
            Some(c) => c,
            None => {
                warn!("🔀️ No configuration for processor '{}'. Skipping {notification}", notification.processor);
                return None;
            },
        };
        if kind == ActionKind::RequestCapture && !context.capture_from_listener {
            info!("🔀️ Capture from the listener is disabled for {}. Skipping {notification}", context.processor);
            return None;
        }
        Some(Action { kind, context, db: &self.db })
    }
}

pub struct Action<'a, B> {
    kind: ActionKind,
    context: &'a ProcessorContext,
    db: &'a B,
}

impl<'a, B> Action<'a, B>
where B: ReconciliationDatabase
{
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Returns whether the message reached its queue (or, failing that, the damaged store). The result is only used for
    /// logging.
    pub async fn execute(&self, notification: &CanonicalNotification) -> bool {
        let queue = match notification.destination_queue(self.context) {
            Some(q) => q,
            None => return false,
        };
        let body = match self.message(notification) {
            Ok(body) => body,
            Err(e) => {
                warn!("🔀️ {} for {notification} could not be carried out. {e}", self.kind);
                return false;
            },
        };
        match self.db.push(&queue, &body).await {
            Ok(id) => {
                debug!("🔀️ {} for {notification} queued on {queue} as #{id}", self.kind);
                true
            },
            Err(e) => {
                warn!("🔀️ Could not push to {queue}. Parking the message in the damaged store. {e}");
                let now = now_ms();
                let damaged = NewDamagedMessage::new(queue.clone(), body, e.to_string(), now).retry_at(now);
                match self.db.store_damaged(damaged).await {
                    Ok(id) => {
                        info!("🚑️ {} for {notification} parked as damaged message #{id}", self.kind);
                        true
                    },
                    Err(e) => {
                        error!("🚑️ {} for {notification} was lost. The damaged store is unavailable too. {e}", self.kind);
                        false
                    },
                }
            },
        }
    }

    fn message(&self, n: &CanonicalNotification) -> Result<Value, String> {
        let value = match self.kind {
            ActionKind::RequestCapture => {
                let job = ProcessCaptureRequest::from_notification(n).ok_or("The authorization has no order id")?;
                Job::ProcessCaptureRequest(job).to_envelope().map(|e| e.to_value())
            },
            ActionKind::RecordCapture => {
                let job = RecordCapture::from_notification(n).ok_or("The capture confirmation has no order id")?;
                Job::RecordCapture(job).to_envelope().map(|e| e.to_value())
            },
            ActionKind::RecordRecurringContract => {
                let job = RecurringContract::from_notification(n).ok_or("The recurring contract has no order id")?;
                Job::RecurringContract(job).to_envelope().map(|e| e.to_value())
            },
            ActionKind::EmitRefund => {
                let msg = RefundMessage::from_notification(n).ok_or("Not a refund")?;
                serde_json::to_value(msg)
            },
            ActionKind::EmitRecurring => {
                let msg = RecurringMessage::from_notification(n).ok_or("Not a recurring event")?;
                serde_json::to_value(msg)
            },
        };
        value.map_err(|e| e.to_string())
    }
}

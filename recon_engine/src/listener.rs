//! # Webhook listener core
//!
//! The transport-independent half of the listener. The HTTP layer authenticates the caller and decodes the payload
//! into a [`Delivery`]; [`WebhookListener::handle`] does the rest.
//!
//! A delivery that passed the security check is always acknowledged, whatever happens to the notifications inside
//! it. Processors retry deliveries that aren't acknowledged, and one unprocessable notification must not cause a retry
//! storm for the whole batch.
use log::*;

use crate::{
    dispatch::ActionDispatcher,
    notifications::{ActionKind, CanonicalNotification, DecodeError, DecoderRegistry},
    traits::ReconciliationDatabase,
};

/// One inbound webhook call, after the security check and decoding.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub processor: String,
    pub authenticated: bool,
    pub notifications: Vec<Result<CanonicalNotification, DecodeError>>,
}

impl Delivery {
    /// Decodes `body` with the named decoder. If the payload can't be decoded at all, the delivery simply carries no
    /// notifications.
    pub fn decode(registry: &DecoderRegistry, decoder: &str, processor: &str, authenticated: bool, body: &[u8]) -> Self {
        let notifications = if authenticated {
            registry.decode(decoder, processor, body).unwrap_or_else(|e| {
                error!("📬️ Could not decode delivery from {processor}. {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        Self { processor: processor.to_string(), authenticated, notifications }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Executed { action: ActionKind, success: bool },
    NoAction,
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckResponse {
    Accepted(Vec<NotificationOutcome>),
    Unauthorized,
}

impl AckResponse {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

pub struct WebhookListener<B> {
    dispatcher: ActionDispatcher<B>,
}

impl<B> WebhookListener<B>
where B: ReconciliationDatabase
{
    pub fn new(dispatcher: ActionDispatcher<B>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher<B> {
        &self.dispatcher
    }

    /// Resolves and executes the action for each notification in turn.
    pub async fn handle(&self, delivery: Delivery) -> AckResponse {
        if !delivery.authenticated {
            warn!("🔐️ Unauthenticated delivery for {}. Nothing was processed", delivery.processor);
            return AckResponse::Unauthorized;
        }
        let count = delivery.notifications.len();
        debug!("📬️ Delivery from {} with {count} notification(s)", delivery.processor);
        let mut outcomes = Vec::with_capacity(count);
        for (i, notification) in delivery.notifications.into_iter().enumerate() {
            let outcome = match notification {
                Err(e) => {
                    warn!("📬️ Skipping notification #{i} from {}. {e}", delivery.processor);
                    NotificationOutcome::Malformed(e.to_string())
                },
                Ok(n) => match self.dispatcher.resolve(&n) {
                    Some(action) => {
                        let success = action.execute(&n).await;
                        info!("📬️ {n}: {} {}", action.kind(), if success { "succeeded" } else { "failed" });
                        NotificationOutcome::Executed { action: action.kind(), success }
                    },
                    None => {
                        info!("📬️ {n}: no action");
                        NotificationOutcome::NoAction
                    },
                },
            };
            outcomes.push(outcome);
        }
        AckResponse::Accepted(outcomes)
    }
}

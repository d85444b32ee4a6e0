//! # Queue consumers and maintenance
//!
//! [`QueueConsumer`] pulls job envelopes off the jobs queues, rebuilds and runs them, and applies the failure policy.
//! The functions in [`maintenance`] are run periodically by the server: moving damaged messages whose retry date has
//! come back onto their queues, and deleting abandoned pending records.
mod consumer;
pub mod maintenance;

pub use consumer::{BatchSummary, ConsumerSettings, MessageOutcome, QueueConsumer};
pub use maintenance::{expire_pending, requeue_due_messages};

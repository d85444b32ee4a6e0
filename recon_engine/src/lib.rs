//! Notification reconciliation engine
//!
//! Payment processors tell us what happened to a payment through webhooks that arrive at least once, in any order, and
//! sometimes long after the fact. This library reconciles those notifications with the payment attempts donors started
//! on the front end, decides whether each authorization should be captured, and publishes the final outcome to the
//! queues that accounting and CRM systems consume. It does this without ever capturing an attempt twice.
//!
//! The library is divided into a few sections:
//! 1. The canonical notification model ([`mod@notifications`]) and the decoders that produce it from processor
//!    payloads.
//! 2. The listener core ([`mod@listener`]) and the action dispatcher ([`mod@dispatch`]) that turn notifications into
//!    queued jobs and outcome messages.
//! 3. The capture decision engine ([`mod@capture`]), the jobs that carry decisions out ([`mod@jobs`]) and the queue
//!    consumer runtime ([`mod@worker`]).
//! 4. The backend contracts ([`mod@traits`]) and an SQLite implementation of them ([`SqliteDatabase`]).
//!
//! Nothing in here reads global configuration. Each component is handed the [`ProcessorContext`] it works with.
pub mod capture;
pub mod context;
pub mod db_types;
pub mod dispatch;
pub mod helpers;
pub mod jobs;
pub mod listener;
pub mod notifications;
pub mod outcomes;
pub mod risk;
pub mod traits;
pub mod worker;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use context::{ProcessorContext, ProcessorDirectory, RiskThresholds};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

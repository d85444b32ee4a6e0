//! # Backend contracts
//!
//! The reconciliation pipeline talks to storage and to payment processors only through the traits in this module.
//!
//! * [`PendingStore`] correlates processor notifications with the attempts donors started on the front end. It is
//!   also where the at-most-once capture guarantee lives: [`PendingStore::try_claim_capture`] must be a single atomic
//!   compare-and-set.
//! * [`FraudStore`] keeps the fraud screening history of each attempt, which outlives the pending record and can stand
//!   in for it when it goes missing.
//! * [`JobQueue`] is a durable, at-least-once queue. Jobs and outcome messages both travel over it.
//! * [`DamagedStore`] holds messages that failed, either until a retry date or until an operator looks at them.
//! * [`ReconciliationDatabase`] ties the four together and adds the operations that must span more than one of them
//!   atomically.
//! * [`PaymentProcessor`] is the outbound API of a processor (capture and cancel).
mod damaged_store;
mod fraud_store;
mod job_queue;
mod payment_processor;
mod pending_store;
mod reconciliation_database;

pub use damaged_store::DamagedStore;
pub use fraud_store::FraudStore;
pub use job_queue::JobQueue;
pub use payment_processor::{CaptureRequest, CaptureResponse, PaymentProcessor, ProcessorError};
pub use pending_store::PendingStore;
pub use reconciliation_database::{ReconciliationDatabase, StoreError};

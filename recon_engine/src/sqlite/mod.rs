//! SQLite backend for the reconciliation engine.
//!
//! Pending records, queue messages and damaged messages all live in the same database, which is what lets
//! [`crate::traits::ReconciliationDatabase`] move data between them atomically.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;

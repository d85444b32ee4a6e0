//! # Reconciliation server
//! This crate hosts the HTTP side of the reconciliation system. It is responsible for:
//! * Listening for webhook deliveries from the configured payment processors.
//! * Checking that each delivery comes from an allowed address and carries a valid HMAC signature.
//! * Decoding the delivery and handing it to the [`recon_engine::listener::WebhookListener`].
//! * Running the background workers that consume the job queues, requeue damaged messages and expire stale pending
//!   records.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/listener/{processor}`: The webhook route for each configured processor.
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod ip_allowlist;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;

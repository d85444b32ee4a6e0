//! Helpers for tests in this crate and downstream crates. Enabled with the `test_utils` feature.
pub mod fakes;
pub mod prepare_env;

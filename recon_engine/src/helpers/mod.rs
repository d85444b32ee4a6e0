mod order_reference;

use std::time::Duration;

use chrono::Utc;

pub use order_reference::{is_likely_recurring_installment, order_sequence};

/// The current time as milliseconds since the Unix epoch. Queue timing columns are stored in this form.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

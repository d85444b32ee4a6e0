//! Small value types shared by the reconciliation engine and server.
mod minor_units;

pub mod helpers;
pub mod op;
mod secret;

pub use minor_units::{currency_exponent, MinorUnits, MinorUnitsConversionError};
pub use secret::Secret;

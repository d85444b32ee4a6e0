use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

const ZERO_DECIMAL_CURRENCIES: [&str; 17] = [
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "UYI", "VND", "VUV", "XAF", "XOF", "XPF",
];
const THREE_DECIMAL_CURRENCIES: [&str; 7] = ["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// The number of decimal places used for the minor unit of the given ISO-4217 currency code.
pub fn currency_exponent(currency: &str) -> u32 {
    let code = currency.trim().to_ascii_uppercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        3
    } else {
        2
    }
}

//--------------------------------------     MinorUnits       --------------------------------------------------------
/// An amount of money, expressed as an integer number of the currency's minor units (e.g. cents).
///
/// The currency is carried alongside the amount, never inside it, so converting to and from a decimal string requires
/// the currency code.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(unary MinorUnits, Neg, neg);

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}¤", self.0)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Parses a decimal amount such as `"10.50"` for the given currency. More fractional digits than the currency
    /// supports is an error, since silently rounding money is never what we want.
    pub fn from_decimal_str(amount: &str, currency: &str) -> Result<Self, MinorUnitsConversionError> {
        let exponent = currency_exponent(currency);
        let s = amount.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let frac = frac.trim_end_matches('0');
        let valid = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !valid(whole) || !valid(frac) {
            return Err(MinorUnitsConversionError(format!("'{amount}' is not a decimal amount")));
        }
        if frac.len() > exponent as usize {
            return Err(MinorUnitsConversionError(format!(
                "'{amount}' has more precision than {currency} allows ({exponent} decimals)"
            )));
        }
        let padded = format!("{whole}{frac:0<width$}", width = exponent as usize);
        let value = padded
            .trim_start_matches('0')
            .parse::<i64>()
            .or_else(|e| if padded.chars().all(|c| c == '0') { Ok(0) } else { Err(e) })
            .map_err(|e| MinorUnitsConversionError(format!("'{amount}' is out of range. {e}")))?;
        Ok(Self(if negative { -value } else { value }))
    }

    /// Formats the amount as a decimal string with exactly as many fractional digits as the currency uses.
    pub fn to_decimal_string(&self, currency: &str) -> String {
        let exponent = currency_exponent(currency);
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        if exponent == 0 {
            return format!("{sign}{abs}");
        }
        let scale = 10u64.pow(exponent);
        format!("{sign}{}.{:0width$}", abs / scale, abs % scale, width = exponent as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_decimal_amounts() {
        assert_eq!(MinorUnits::from_decimal_str("10.50", "USD").unwrap().value(), 1050);
        assert_eq!(MinorUnits::from_decimal_str("10.5", "usd").unwrap().value(), 1050);
        assert_eq!(MinorUnits::from_decimal_str("10", "EUR").unwrap().value(), 1000);
        assert_eq!(MinorUnits::from_decimal_str("0.07", "EUR").unwrap().value(), 7);
        assert_eq!(MinorUnits::from_decimal_str("0", "EUR").unwrap().value(), 0);
        assert_eq!(MinorUnits::from_decimal_str("1500", "JPY").unwrap().value(), 1500);
        assert_eq!(MinorUnits::from_decimal_str("1.234", "KWD").unwrap().value(), 1234);
        assert_eq!(MinorUnits::from_decimal_str("-3.25", "GBP").unwrap().value(), -325);
        assert!(MinorUnits::from_decimal_str("10.505", "USD").is_err());
        assert!(MinorUnits::from_decimal_str("1.5", "JPY").is_err());
        assert!(MinorUnits::from_decimal_str("abc", "USD").is_err());
        assert!(MinorUnits::from_decimal_str("", "USD").is_err());
    }

    #[test]
    fn format_decimal_amounts() {
        assert_eq!(MinorUnits::from(1050).to_decimal_string("USD"), "10.50");
        assert_eq!(MinorUnits::from(7).to_decimal_string("EUR"), "0.07");
        assert_eq!(MinorUnits::from(1500).to_decimal_string("JPY"), "1500");
        assert_eq!(MinorUnits::from(-325).to_decimal_string("GBP"), "-3.25");
        assert_eq!(MinorUnits::from(1234).to_decimal_string("BHD"), "1.234");
    }

    #[test]
    fn arithmetic() {
        let total: MinorUnits = vec![MinorUnits::from(100), MinorUnits::from(250)].into_iter().sum();
        assert_eq!(total, MinorUnits::from(350));
        assert_eq!(-total, MinorUnits::from(-350));
    }
}

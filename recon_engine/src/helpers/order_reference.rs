use regex::Regex;

/// Order ids are `<contribution id>.<attempt sequence>`. Returns the attempt sequence, if the order id has one.
pub fn order_sequence(order_id: &str) -> Option<u32> {
    let re = Regex::new(r"^[\w-]+\.(\d+)$").ok()?;
    re.captures(order_id.trim()).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok())
}

/// Amex and Discover send a fresh authorization notification for every installment of a recurring donation, using
/// the merchant reference of the original donation with a higher sequence number. These have no pending record and
/// must not be treated as missing.
pub fn is_likely_recurring_installment(payment_method: Option<&str>, order_id: &str) -> bool {
    let card = payment_method.map(|m| m.trim().to_ascii_lowercase()).unwrap_or_default();
    matches!(card.as_str(), "amex" | "discover") && order_sequence(order_id).map(|seq| seq > 1).unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn find_order_sequences() {
        assert_eq!(order_sequence(""), None);
        assert_eq!(order_sequence("12345"), None);
        assert_eq!(order_sequence("12345.1"), Some(1));
        assert_eq!(order_sequence("abc-99.12"), Some(12));
        assert_eq!(order_sequence("12345.x"), None);
    }

    #[test]
    fn recurring_installments() {
        assert!(is_likely_recurring_installment(Some("amex"), "12345.2"));
        assert!(is_likely_recurring_installment(Some("Discover"), "12345.3"));
        assert!(!is_likely_recurring_installment(Some("amex"), "12345.1"));
        assert!(!is_likely_recurring_installment(Some("visa"), "12345.2"));
        assert!(!is_likely_recurring_installment(None, "12345.2"));
    }
}

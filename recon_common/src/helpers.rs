use std::collections::HashMap;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parses a `key:value,key:value` list into a map. Entries that are not of the form `key:value`, or whose value does not
/// parse, are returned in the second element so that callers can report them.
pub fn parse_key_value_list<V: std::str::FromStr>(value: &str) -> (HashMap<String, V>, Vec<String>) {
    let mut map = HashMap::new();
    let mut rejected = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once(':') {
            Some((k, v)) => match v.trim().parse::<V>() {
                Ok(v) => {
                    map.insert(k.trim().to_string(), v);
                },
                Err(_) => rejected.push(entry.to_string()),
            },
            None => rejected.push(entry.to_string()),
        }
    }
    (map, rejected)
}

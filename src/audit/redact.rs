//! Argument summaries for audit records
//!
//! Secret-looking keys are masked, long strings and lists are reduced to
//! their size. Raw values of that kind never reach the trail. Keys, key
//! counts and nesting are capped too, so a summary stays small whatever the
//! caller sends.

use serde_json::{json, Map, Value};

use crate::models::{bounded, Parameters};

pub const REDACTED: &str = "[redacted]";

/// Holds the number of keys left out of a summarized object.
pub const OMITTED_KEYS: &str = "<omitted keys>";

const MAX_INLINE_CHARS: usize = 64;
const MAX_KEYS: usize = 32;
const MAX_DEPTH: usize = 3;

const SECRET_MARKERS: &[&str] = &["password", "secret", "token", "api_key", "authorization"];

pub fn summarize_arguments(parameters: &Parameters) -> Value {
    Value::Object(summarize_map(parameters, 0))
}

fn summarize_map(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    let mut summary: Map<String, Value> = map
        .iter()
        .take(MAX_KEYS)
        .map(|(key, value)| {
            let value = if is_secret(key) {
                Value::String(REDACTED.to_string())
            } else {
                summarize_value(value, depth)
            };
            (bounded(key), value)
        })
        .collect();

    if map.len() > MAX_KEYS {
        summary.insert(OMITTED_KEYS.to_string(), json!(map.len() - MAX_KEYS));
    }
    summary
}

fn summarize_value(value: &Value, depth: usize) -> Value {
    match value {
        Value::String(s) => {
            let len = s.chars().count();
            if len > MAX_INLINE_CHARS {
                json!(format!("<{} chars>", len))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => json!(format!("<{} items>", items.len())),
        Value::Object(map) if depth + 1 >= MAX_DEPTH => json!(format!("<{} keys>", map.len())),
        Value::Object(map) => Value::Object(summarize_map(map, depth + 1)),
        _ => value.clone(),
    }
}

fn is_secret(key: &str) -> bool {
    let key = key.to_lowercase();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => Parameters::new(),
        }
    }

    #[test]
    fn test_short_values_pass_through() {
        let summary = summarize_arguments(&params(json!({"session_id": 3, "session_name": "Q3"})));
        assert_eq!(summary, json!({"session_id": 3, "session_name": "Q3"}));
    }

    #[test]
    fn test_secrets_long_strings_and_lists_are_reduced() {
        let summary = summarize_arguments(&params(json!({
            "API_KEY": "abc",
            "session_name": "n".repeat(5000),
            "transactions": [{"amount": 1}, {"amount": 2}],
            "nested": {"auth_token": "t", "ok": true},
        })));

        assert_eq!(
            summary,
            json!({
                "API_KEY": REDACTED,
                "session_name": "<5000 chars>",
                "transactions": "<2 items>",
                "nested": {"auth_token": REDACTED, "ok": true},
            })
        );
    }

    #[test]
    fn test_keys_count_and_depth_are_capped() {
        let mut input = Parameters::new();
        input.insert("a".repeat(100_000), json!(1));
        for i in 0..40 {
            input.insert(format!("key_{:02}", i), json!(i));
        }

        let summary = summarize_arguments(&input);
        let map = summary.as_object().unwrap();

        assert!(map.contains_key("<100000 chars>"));
        assert!(map.keys().all(|k| k.chars().count() <= 64));
        assert_eq!(map[OMITTED_KEYS], json!(41 - MAX_KEYS));
        assert!(summary.to_string().len() < 2_000);

        let nested = summarize_arguments(&params(json!({"z": {"a": {"b": {"c": 1}}}})));
        assert_eq!(nested, json!({"z": {"a": {"b": "<1 keys>"}}}));
    }

    #[test]
    fn test_boundary_string_is_kept() {
        let exact = "e".repeat(MAX_INLINE_CHARS);
        let summary = summarize_arguments(&params(json!({"description": exact.clone()})));
        assert_eq!(summary, json!({"description": exact}));
    }
}

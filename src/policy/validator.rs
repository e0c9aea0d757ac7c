//! Input validation against declared parameter schemas
//!
//! Fails closed: undeclared parameters and missing required ones are
//! violations, never silently dropped. Stateless and deterministic.

use serde_json::Value;

use super::{ActionSpec, FieldKind, FieldSpec, Presence};
use crate::models::{bounded, FieldViolation, Parameters, PolicyDecision};

/// Undeclared keys named individually; the rest are only counted.
const MAX_LISTED_UNDECLARED: usize = 5;

/// Validate `parameters` against `spec`.
pub fn validate(spec: &ActionSpec, parameters: &Parameters) -> PolicyDecision {
    let mut violations = Vec::new();

    let mut undeclared: Vec<&String> = parameters
        .keys()
        .filter(|key| !spec.fields.iter().any(|f| f.name == key.as_str()))
        .collect();
    undeclared.sort();
    for key in undeclared.iter().take(MAX_LISTED_UNDECLARED) {
        violations.push(FieldViolation::new(bounded(key), "undeclared parameter"));
    }
    if undeclared.len() > MAX_LISTED_UNDECLARED {
        violations.push(FieldViolation::new(
            format!("and {} more", undeclared.len() - MAX_LISTED_UNDECLARED),
            "undeclared parameters",
        ));
    }

    for field in spec.fields {
        if let Some(message) = check_field(field, parameters.get(field.name)) {
            violations.push(FieldViolation::new(field.name, message));
        }
    }

    if violations.is_empty() {
        PolicyDecision::allow()
    } else {
        PolicyDecision::validation_failed(violations)
    }
}

/// Fill optional fields that were left out. Call only after `validate` allowed
/// the parameters.
pub fn resolve_defaults(spec: &ActionSpec, parameters: &Parameters) -> Parameters {
    let mut resolved = parameters.clone();
    for field in spec.fields {
        if field.presence == Presence::Optional {
            resolved.entry(field.name.to_string()).or_insert(Value::Null);
        }
    }
    resolved
}

fn check_field(field: &FieldSpec, value: Option<&Value>) -> Option<String> {
    let value = match value {
        None | Some(Value::Null) => {
            return match field.presence {
                Presence::Required => Some("is required".to_string()),
                Presence::Optional => None,
            };
        }
        Some(value) => value,
    };

    match field.kind {
        FieldKind::Integer { min, max } => {
            let Some(n) = value.as_i64() else {
                return Some(format!("must be an integer, got {}", type_name(value)));
            };
            if n < min {
                Some(format!("must be at least {} (got {})", min, n))
            } else if n > max {
                Some(format!("must be at most {} (got {})", max, n))
            } else {
                None
            }
        }
        FieldKind::Text { min_len, max_len } => {
            let Some(text) = value.as_str() else {
                return Some(format!("must be a string, got {}", type_name(value)));
            };
            let len = text.chars().count();
            if len < min_len {
                Some(format!("must be at least {} characters (got {})", min_len, len))
            } else if len > max_len {
                Some(format!("exceeds maximum length {} (got {})", max_len, len))
            } else {
                None
            }
        }
        FieldKind::ObjectList { max_items } => {
            let Some(items) = value.as_array() else {
                return Some(format!("must be a list, got {}", type_name(value)));
            };
            if items.len() > max_items {
                return Some(format!(
                    "exceeds maximum item count {} (got {})",
                    max_items,
                    items.len()
                ));
            }
            items
                .iter()
                .position(|item| !item.is_object())
                .map(|index| format!("item {} must be an object", index))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

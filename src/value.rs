//! Coercion and truthiness helpers over the engine's value representation.
//!
//! The engine represents a JSON value as `serde_json::Value` directly,
//! the same way the teacher provider crate threads `serde_json::Value`
//! through its flag model and variant map (see `model.rs`). `serde_json`'s
//! own `PartialEq` does not coerce across the int/float boundary the way
//! the targeting spec requires, so the coercion rules of §3 live here as
//! free functions instead of a parallel value type.

use serde_json::Value;

/// JSON-Logic truthiness: null/false/0/0.0/""/[]/{} are false, everything
/// else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Value equality that coerces across the int/double numeric tags, as
/// required by §3 ("Equality across numeric tags coerces int↔double").
/// Used for the resolver's "targeting outcome matches a variant value"
/// fallback (§4.4).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Returns the JSON type tag name used in diagnostics (`TYPE_MISMATCH`
/// messages).
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

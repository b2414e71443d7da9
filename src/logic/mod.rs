//! Component B: the JSON-Logic interpreter, generalized from the teacher's
//! `targeting/mod.rs` `Operator` struct. Standard JSON-Logic operators
//! (`var`, `if`, `and`/`or`, the arithmetic and comparison families, the
//! higher-order `map`/`filter`/`reduce`/…) are evaluated by the
//! `datalogic-rs` dependency; this module registers the four
//! domain-specific operators from §4.1 on top of it and owns the
//! rule/context ↔ interpreter-native conversion.

mod fractional;
mod sem_ver;
mod string_ops;

use datalogic_rs::{DataLogic, DataValue, FromJson};
use fractional::Fractional;
use sem_ver::SemVer;
use std::sync::Mutex;
use string_ops::{EndsWith, StartsWith};
use tracing::trace;

/// Evaluation outcome of a targeting rule. `None` means the rule evaluated
/// to `null` or produced no match (resolver falls through to `DEFAULT`);
/// `Some(Err(_))` is a hard interpreter error (resolver surfaces
/// `reason=ERROR, errorCode=GENERAL`, spec §4.4 step 5).
pub type LogicResult = Result<Option<serde_json::Value>, LogicEvalError>;

#[derive(Debug, thiserror::Error)]
pub enum LogicEvalError {
    #[error("malformed targeting rule: {0}")]
    MalformedRule(String),
    #[error("interpreter error: {0}")]
    Interpreter(String),
}

/// Thread-safe wrapper around a `DataLogic` instance with the engine's
/// custom operators registered. One instance is shared by the whole
/// facade (§5: evaluations may run concurrently; the interpreter itself
/// is not re-entrant, hence the `Mutex` — matching the teacher's
/// `Arc<Mutex<DataLogic>>` shape).
pub struct Interpreter {
    logic: Mutex<DataLogic>,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut logic = DataLogic::new();
        logic.register_custom_operator("fractional", Box::new(Fractional));
        logic.register_custom_operator("sem_ver", Box::new(SemVer));
        logic.register_custom_operator("starts_with", Box::new(StartsWith));
        logic.register_custom_operator("ends_with", Box::new(EndsWith));
        Self { logic: Mutex::new(logic) }
    }

    /// Evaluates `rule` against the already-enriched `context` (see
    /// `resolver.rs` for enrichment). Returns:
    /// - `Ok(Some(value))` for a concrete outcome (string variant name, or
    ///   a bare value for the variant-value-match convenience path),
    /// - `Ok(None)` when the rule evaluates to `null` or a custom operator
    ///   signaled "no match",
    /// - `Err` only for a genuine interpreter failure.
    pub fn evaluate(&self, rule: &serde_json::Value, context: &serde_json::Value) -> LogicResult {
        let logic = self.logic.lock().map_err(|_| LogicEvalError::Interpreter("poisoned lock".into()))?;

        let parsed = logic
            .parse_logic_json(rule, None)
            .map_err(|e| LogicEvalError::MalformedRule(e.to_string()))?;

        let data = DataValue::from_json(context, logic.arena());

        match logic.evaluate(&parsed, &data) {
            Ok(DataValue::Null) => Ok(None),
            Ok(DataValue::String(s)) => Ok(Some(serde_json::Value::String(s.to_string()))),
            Ok(DataValue::Bool(b)) => Ok(Some(serde_json::Value::Bool(b))),
            Ok(other) => {
                trace!("targeting rule evaluated to non-string/bool value: {:?}", other);
                Ok(Some(json_from_data_value(&other)))
            }
            Err(e) => Err(LogicEvalError::Interpreter(e.to_string())),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort conversion back to `serde_json::Value` for the rare case a
/// targeting rule returns a structured value directly (spec §4.4's
/// "outcome is a value that matches a variant's value" path).
fn json_from_data_value(value: &DataValue<'_>) -> serde_json::Value {
    match value {
        DataValue::Null => serde_json::Value::Null,
        DataValue::Bool(b) => serde_json::Value::Bool(*b),
        DataValue::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        DataValue::String(s) => serde_json::Value::String(s.to_string()),
        DataValue::Array(arr) => serde_json::Value::Array(arr.iter().map(json_from_data_value).collect()),
        DataValue::Object(entries) => serde_json::Value::Object(
            entries.iter().map(|(k, v)| (k.to_string(), json_from_data_value(v))).collect(),
        ),
        _ => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: serde_json::Value) -> serde_json::Value {
        value
    }

    #[test]
    fn evaluates_equality_rule() {
        let interp = Interpreter::new();
        let rule = json!({"==": [{"var": "role"}, "admin"]});
        let result = interp.evaluate(&rule, &ctx(json!({"role": "admin"}))).unwrap();
        assert_eq!(result, Some(json!(true)));
    }

    #[test]
    fn starts_with_operator() {
        let interp = Interpreter::new();
        let rule = json!({"starts_with": [{"var": "email"}, "admin@"]});
        let result = interp
            .evaluate(&rule, &ctx(json!({"email": "admin@example.com"})))
            .unwrap();
        assert_eq!(result, Some(json!(true)));
    }

    #[test]
    fn ends_with_operator_false_on_type_mismatch() {
        let interp = Interpreter::new();
        let rule = json!({"ends_with": [{"var": "count"}, "@x"]});
        let result = interp.evaluate(&rule, &ctx(json!({"count": 5}))).unwrap();
        assert_eq!(result, Some(json!(false)));
    }

    #[test]
    fn sem_ver_caret_range() {
        let interp = Interpreter::new();
        let rule = json!({"sem_ver": [{"var": "v"}, "^", "1.2.0"]});
        assert_eq!(
            interp.evaluate(&rule, &ctx(json!({"v": "1.5.3"}))).unwrap(),
            Some(json!(true))
        );
        assert_eq!(
            interp.evaluate(&rule, &ctx(json!({"v": "2.0.0"}))).unwrap(),
            Some(json!(false))
        );
    }

    #[test]
    fn fractional_is_deterministic() {
        let interp = Interpreter::new();
        let rule = json!({"fractional": [{"var": "userId"}, ["A", 50], ["B", 50]]});
        let context = ctx(json!({"userId": "user123"}));
        let a = interp.evaluate(&rule, &context).unwrap();
        let b = interp.evaluate(&rule, &context).unwrap();
        assert_eq!(a, b);
        assert!(matches!(a, Some(serde_json::Value::String(_))));
    }
}

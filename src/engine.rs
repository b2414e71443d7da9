//! Component G: the evaluator facade (spec §4.6). The single entry point
//! a native caller uses: compile-and-publish a new configuration, then
//! evaluate flags against it.
//!
//! Modeled on the teacher's `FlagStore` (`resolver/in_process/storage/
//! mod.rs`): one `Arc<CompiledState>` behind a `RwLock`, swapped whole on
//! every update, cloned out under a read guard for every evaluation so
//! the guard itself is held only for the length of a pointer copy (spec
//! §5: "Facade thread-safe across evaluations; `update_state`
//! exclusive").

use crate::compiler::{self, CompiledState, StateUpdateResult};
use crate::error::EngineError;
use crate::logic::Interpreter;
use crate::model::ConfigurationDocument;
use crate::resolver::{self, ErrorCode, EvaluationResult, ResolutionReason};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The one configuration knob this engine exposes (spec §0), mirrored by
/// the sandboxed `set_validation_mode` export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Malformed individual flags are kept in the table as permanent
    /// `PARSE_ERROR` stubs; the rest of the document still publishes.
    Permissive,
    /// A configuration document containing even one malformed flag is
    /// rejected outright and the previously published state is kept.
    Strict,
}

impl ValidationMode {
    fn from_u32(raw: u32) -> Self {
        if raw == 0 { ValidationMode::Permissive } else { ValidationMode::Strict }
    }
}

pub struct FlagEvaluator {
    state: RwLock<Arc<CompiledState>>,
    interpreter: Interpreter,
    validation_mode: AtomicU8,
}

impl FlagEvaluator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(CompiledState::default())),
            interpreter: Interpreter::new(),
            validation_mode: AtomicU8::new(0),
        }
    }

    pub fn validation_mode(&self) -> ValidationMode {
        ValidationMode::from_u32(self.validation_mode.load(Ordering::Relaxed) as u32)
    }

    pub fn set_validation_mode(&self, mode: ValidationMode) {
        self.validation_mode.store(mode as u8, Ordering::Relaxed);
    }

    /// Parses and compiles `config_json`, then atomically publishes it.
    /// Every update is a full replacement (spec §9 Non-goals: no
    /// partial/streaming updates).
    pub fn update_state(&self, config_json: &str) -> Result<StateUpdateResult, EngineError> {
        let doc: ConfigurationDocument =
            serde_json::from_str(config_json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        self.update_state_from(doc)
    }

    pub fn update_state_from(&self, doc: ConfigurationDocument) -> Result<StateUpdateResult, EngineError> {
        if doc.flags.is_empty() {
            warn!("update_state received a configuration with no flags");
        }

        let malformed: Vec<&String> = doc.flags.iter().filter(|(_, f)| !f.is_well_formed()).map(|(k, _)| k).collect();
        if self.validation_mode() == ValidationMode::Strict && !malformed.is_empty() {
            return Err(EngineError::InvalidConfig(format!(
                "strict validation rejected {} malformed flag(s): {:?}",
                malformed.len(),
                malformed
            )));
        }

        let (state, summary) = compiler::compile(&doc, &self.interpreter);
        let mut guard = self.state.write().map_err(|_| EngineError::Poisoned)?;
        *guard = Arc::new(state);
        info!(flags = summary.flag_indices.len(), pre_evaluated = summary.pre_evaluated, "published new flag state");
        Ok(summary)
    }

    fn snapshot(&self) -> Result<Arc<CompiledState>, EngineError> {
        self.state.read().map(|g| Arc::clone(&g)).map_err(|_| EngineError::Poisoned)
    }

    /// Evaluates `flag_key` against `context`. Never returns a Rust
    /// `Err`: every failure mode is reported as data inside the
    /// `EvaluationResult` (spec §7).
    pub fn evaluate(&self, flag_key: &str, context: &serde_json::Value) -> EvaluationResult {
        let state = match self.snapshot() {
            Ok(s) => s,
            Err(_) => return error_result(ErrorCode::General),
        };

        let Some(compiled) = state.flags.get(flag_key) else {
            return error_result(ErrorCode::FlagNotFound);
        };

        if let Some(cached) = &compiled.pre_evaluated {
            return cached.clone();
        }

        let filtered = filter_context(context, &compiled.required_context_keys);
        resolver::resolve(flag_key, Some(&compiled.flag), &filtered, &self.interpreter)
    }

    /// Sandbox-facing counterpart of [`Self::evaluate`] used by
    /// `evaluate_by_index` (spec §4.7): looks a flag up by its dense
    /// index instead of its string key.
    pub fn evaluate_by_index(&self, index: usize, context: &serde_json::Value) -> EvaluationResult {
        let state = match self.snapshot() {
            Ok(s) => s,
            Err(_) => return error_result(ErrorCode::General),
        };

        let Some(compiled) = state.by_index(index) else {
            return error_result(ErrorCode::FlagNotFound);
        };

        if let Some(cached) = &compiled.pre_evaluated {
            return cached.clone();
        }

        let key = &state.index_order[index];
        let filtered = filter_context(context, &compiled.required_context_keys);
        resolver::resolve(key, Some(&compiled.flag), &filtered, &self.interpreter)
    }

    pub fn evaluate_bool(&self, flag_key: &str, context: &serde_json::Value, default: bool) -> bool {
        self.evaluate(flag_key, context).as_bool(default)
    }

    pub fn evaluate_string(&self, flag_key: &str, context: &serde_json::Value, default: &str) -> String {
        self.evaluate(flag_key, context).as_string(default)
    }

    pub fn evaluate_int(&self, flag_key: &str, context: &serde_json::Value, default: i64) -> i64 {
        self.evaluate(flag_key, context).as_int(default)
    }

    pub fn evaluate_float(&self, flag_key: &str, context: &serde_json::Value, default: f64) -> f64 {
        self.evaluate(flag_key, context).as_float(default)
    }
}

impl Default for FlagEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn error_result(code: ErrorCode) -> EvaluationResult {
    EvaluationResult {
        value: serde_json::Value::Null,
        variant: String::new(),
        reason: ResolutionReason::Error,
        error_code: Some(code),
        flag_metadata: Default::default(),
    }
}

/// Restricts `context` to the flag's required-key set. `required_keys`
/// always includes `targetingKey` (`compiler::required_vars`), which is
/// what lets `fractional`'s implicit bucket-key fallback see it even
/// when no targeting rule names it directly (spec §4.1).
fn filter_context(context: &serde_json::Value, required_keys: &[String]) -> serde_json::Value {
    let serde_json::Value::Object(map) = context else {
        return serde_json::Value::Object(serde_json::Map::new());
    };

    let mut filtered = serde_json::Map::new();
    for key in required_keys {
        if let Some(value) = map.get(key) {
            filtered.insert(key.clone(), value.clone());
        }
    }
    serde_json::Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> &'static str {
        r#"{"flags":{
            "welcome-banner":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"on"},
            "dark-mode":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"off",
                "targeting":{"if":[{"==":[{"var":"tier"},"beta"]},"on","off"]}},
            "retired-feature":{"state":"DISABLED","variants":{"on":true,"off":false},"defaultVariant":"off"}
        }}"#
    }

    #[test]
    fn update_then_evaluate_static_flag() {
        let engine = FlagEvaluator::new();
        engine.update_state(config()).unwrap();
        let result = engine.evaluate("welcome-banner", &serde_json::json!({}));
        assert_eq!(result.value, serde_json::json!(true));
        assert_eq!(result.reason, ResolutionReason::Static);
    }

    #[test]
    fn update_then_evaluate_targeted_flag() {
        let engine = FlagEvaluator::new();
        engine.update_state(config()).unwrap();
        let on = engine.evaluate("dark-mode", &serde_json::json!({"tier": "beta"}));
        assert_eq!(on.value, serde_json::json!(true));
        let off = engine.evaluate("dark-mode", &serde_json::json!({"tier": "free"}));
        assert_eq!(off.value, serde_json::json!(false));
    }

    #[test]
    fn disabled_flag_uses_pre_evaluation_cache() {
        let engine = FlagEvaluator::new();
        engine.update_state(config()).unwrap();
        let result = engine.evaluate("retired-feature", &serde_json::json!({}));
        assert_eq!(result.reason, ResolutionReason::Disabled);
        assert_eq!(result.value, serde_json::json!(false));
    }

    #[test]
    fn unknown_flag_before_any_update() {
        let engine = FlagEvaluator::new();
        let result = engine.evaluate("anything", &serde_json::json!({}));
        assert_eq!(result.error_code, Some(ErrorCode::FlagNotFound));
        assert_eq!(result.as_bool(true), true);
    }

    #[test]
    fn evaluate_by_index_matches_evaluate_by_key() {
        let engine = FlagEvaluator::new();
        let summary = engine.update_state(config()).unwrap();
        let index = summary.flag_indices["welcome-banner"];
        let by_index = engine.evaluate_by_index(index, &serde_json::json!({}));
        let by_key = engine.evaluate("welcome-banner", &serde_json::json!({}));
        assert_eq!(by_index.value, by_key.value);
    }

    #[test]
    fn strict_validation_mode_rejects_malformed_documents() {
        let engine = FlagEvaluator::new();
        engine.set_validation_mode(ValidationMode::Strict);
        let bad = r#"{"flags":{"broken":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"missing"}}}"#;
        let err = engine.update_state(bad);
        assert!(err.is_err());
    }

    #[test]
    fn permissive_mode_keeps_malformed_flags_as_parse_error_stubs() {
        let engine = FlagEvaluator::new();
        let bad = r#"{"flags":{"broken":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"missing"}}}"#;
        engine.update_state(bad).unwrap();
        let result = engine.evaluate("broken", &serde_json::json!({}));
        assert_eq!(result.error_code, Some(ErrorCode::ParseError));
    }

    #[test]
    fn unrelated_context_keys_are_filtered_out_before_targeting() {
        let engine = FlagEvaluator::new();
        engine.update_state(config()).unwrap();
        let noisy = serde_json::json!({"tier": "beta", "unrelated_secret": "shhh"});
        let result = engine.evaluate("dark-mode", &noisy);
        assert_eq!(result.value, serde_json::json!(true));
    }
}

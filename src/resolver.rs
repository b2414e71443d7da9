//! Component E: the flag resolver (spec §4.4). Composes interpretation
//! with variant lookup, type coercion, default-value handling, error
//! reporting, and context enrichment.
//!
//! Naming (`ResolutionReason`, `ErrorCode`, `EvaluationResult`) mirrors
//! the real `flagd_evaluator::evaluation` module as referenced by the
//! teacher's `resolver/in_process/resolver/common.rs` (`use
//! flagd_evaluator::evaluation::{ErrorCode, EvaluationResult,
//! ResolutionReason}`).

use crate::logic::{Interpreter, LogicEvalError};
use crate::model::{FeatureFlag, FlagState};
use crate::value::values_equal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Wall-clock seconds since the epoch, used for `$flagd.timestamp`
/// enrichment. The sandboxed build has no ambient clock (spec §4.7) and
/// gets the time from its `host` import instead.
#[cfg(not(target_arch = "wasm32"))]
fn current_unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
fn current_unix_timestamp() -> u64 {
    crate::sandbox::host_time::current_time_unix_seconds()
}

/// Reserved context keys (spec §6).
pub const TARGETING_KEY: &str = "targetingKey";
pub const FLAGD_PROPERTY: &str = "$flagd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionReason {
    #[serde(rename = "STATIC")]
    Static,
    #[serde(rename = "TARGETING_MATCH")]
    TargetingMatch,
    #[serde(rename = "DISABLED")]
    Disabled,
    #[serde(rename = "DEFAULT")]
    Default,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "FLAG_NOT_FOUND")]
    FlagNotFound,
    #[serde(rename = "TYPE_MISMATCH")]
    TypeMismatch,
    #[serde(rename = "PARSE_ERROR")]
    ParseError,
    #[serde(rename = "GENERAL")]
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
    pub reason: ResolutionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub flag_metadata: HashMap<String, serde_json::Value>,
}

impl EvaluationResult {
    fn error(code: ErrorCode) -> Self {
        Self {
            value: serde_json::Value::Null,
            variant: String::new(),
            reason: ResolutionReason::Error,
            error_code: Some(code),
            flag_metadata: HashMap::new(),
        }
    }

    fn disabled(variant: String, value: serde_json::Value, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self { value, variant, reason: ResolutionReason::Disabled, error_code: None, flag_metadata: metadata }
    }

    fn ok(
        variant: String,
        value: serde_json::Value,
        reason: ResolutionReason,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self { value, variant, reason, error_code: None, flag_metadata: metadata }
    }

    /// §4.4 typed-accessor post-filter: any error, or a value whose JSON
    /// tag does not match the requested type, falls back to the caller's
    /// default unchanged.
    pub fn as_bool(&self, default: bool) -> bool {
        if self.error_code.is_some() {
            return default;
        }
        self.value.as_bool().unwrap_or(default)
    }

    pub fn as_string(&self, default: &str) -> String {
        if self.error_code.is_some() {
            return default.to_string();
        }
        self.value.as_str().map(str::to_string).unwrap_or_else(|| default.to_string())
    }

    pub fn as_int(&self, default: i64) -> i64 {
        if self.error_code.is_some() {
            return default;
        }
        self.value.as_i64().unwrap_or(default)
    }

    pub fn as_float(&self, default: f64) -> f64 {
        if self.error_code.is_some() {
            return default;
        }
        self.value.as_f64().unwrap_or(default)
    }
}

/// Builds the enriched evaluation context: `targetingKey` defaulted to
/// `""`, `$flagd = {flagKey, timestamp}` always overwritten (spec §4.4
/// step 5, §9 "Context enrichment overwrites").
pub fn enrich_context(flag_key: &str, context: &serde_json::Value) -> serde_json::Value {
    let mut root = match context {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    root.entry(TARGETING_KEY.to_string())
        .or_insert_with(|| serde_json::Value::String(String::new()));

    let timestamp = current_unix_timestamp();
    root.insert(
        FLAGD_PROPERTY.to_string(),
        serde_json::json!({ "flagKey": flag_key, "timestamp": timestamp }),
    );

    serde_json::Value::Object(root)
}

/// Resolves one flag against one (already-filtered, not-yet-enriched)
/// context.
pub fn resolve(
    flag_key: &str,
    flag: Option<&FeatureFlag>,
    context: &serde_json::Value,
    interpreter: &Interpreter,
) -> EvaluationResult {
    let flag = match flag {
        Some(f) => f,
        None => return EvaluationResult::error(ErrorCode::FlagNotFound),
    };

    if !flag.is_well_formed() {
        debug!("flag {flag_key} has a defaultVariant not present in variants");
        return EvaluationResult::error(ErrorCode::ParseError);
    }

    if flag.state == FlagState::Disabled {
        let value = flag.default_value().cloned().unwrap_or(serde_json::Value::Null);
        return EvaluationResult::disabled(flag.default_variant.clone(), value, flag.metadata.clone());
    }

    let Some(targeting) = &flag.targeting else {
        let value = flag.default_value().cloned().unwrap_or(serde_json::Value::Null);
        return EvaluationResult::ok(flag.default_variant.clone(), value, ResolutionReason::Static, flag.metadata.clone());
    };

    let enriched = enrich_context(flag_key, context);

    match interpreter.evaluate(targeting, &enriched) {
        Ok(Some(serde_json::Value::String(variant))) if flag.variants.contains_key(&variant) => {
            let value = flag.variants[&variant].clone();
            EvaluationResult::ok(variant, value, ResolutionReason::TargetingMatch, flag.metadata.clone())
        }
        Ok(Some(outcome)) => {
            // Rare convenience path: the rule returned a bare value rather
            // than a variant name. Select whichever variant has that value.
            if let Some((variant, value)) =
                flag.variants.iter().find(|(_, v)| values_equal(v, &outcome))
            {
                EvaluationResult::ok(variant.clone(), value.clone(), ResolutionReason::TargetingMatch, flag.metadata.clone())
            } else {
                let value = flag.default_value().cloned().unwrap_or(serde_json::Value::Null);
                EvaluationResult::ok(flag.default_variant.clone(), value, ResolutionReason::Default, flag.metadata.clone())
            }
        }
        Ok(None) => {
            let value = flag.default_value().cloned().unwrap_or(serde_json::Value::Null);
            EvaluationResult::ok(flag.default_variant.clone(), value, ResolutionReason::Default, flag.metadata.clone())
        }
        Err(LogicEvalError::MalformedRule(msg)) => {
            debug!("flag {flag_key} has a malformed targeting rule: {msg}");
            EvaluationResult::error(ErrorCode::ParseError)
        }
        Err(LogicEvalError::Interpreter(msg)) => {
            debug!("flag {flag_key} targeting evaluation failed: {msg}");
            EvaluationResult::error(ErrorCode::General)
        }
    }
}

//! Component F: the state compiler (spec §4.5). Turns a raw
//! [`ConfigurationDocument`] into a [`CompiledState`]: a pre-evaluation
//! cache for pure flags, a required-context-key set per flag (derived by
//! statically scanning each targeting tree for root-scope `var`
//! references), and a dense, sorted-key-order index table.

use crate::logic::Interpreter;
use crate::model::{ConfigurationDocument, FeatureFlag, FlagState};
use crate::resolver::{self, EvaluationResult};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// JSON-Logic operators whose second operand introduces an accumulator
/// scope: `var` references inside it resolve against the current array
/// element, not the root evaluation context, and so must not be counted
/// as required context keys (spec §4.5).
const ACCUMULATOR_OPERATORS: &[&str] = &["map", "filter", "reduce", "all", "none", "some"];

/// One flag plus everything the compiler could precompute about it.
#[derive(Debug, Clone)]
pub struct CompiledFlag {
    pub flag: FeatureFlag,
    pub index: usize,
    pub required_context_keys: Vec<String>,
    /// Present for flags the compiler can resolve without any caller
    /// context at all: `DISABLED` flags, and `ENABLED` flags with no
    /// targeting rule.
    pub pre_evaluated: Option<EvaluationResult>,
}

impl CompiledFlag {
    fn is_pure(&self) -> bool {
        self.flag.state == FlagState::Disabled || self.flag.targeting.is_none()
    }
}

/// The live, immutable, published table a [`crate::engine::FlagEvaluator`]
/// holds behind its lock.
#[derive(Debug, Clone, Default)]
pub struct CompiledState {
    pub flags: HashMap<String, CompiledFlag>,
    /// Dense index → flag key, in the same sorted order the indices were
    /// assigned in.
    pub index_order: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompiledState {
    pub fn by_index(&self, index: usize) -> Option<&CompiledFlag> {
        self.index_order.get(index).and_then(|key| self.flags.get(key))
    }
}

/// Returned from [`compile`] alongside the [`CompiledState`] itself —
/// the diagnostic summary a caller (native or sandboxed) can inspect
/// after an `update_state` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdateResult {
    pub success: bool,
    pub pre_evaluated: usize,
    pub required_context_keys: HashMap<String, Vec<String>>,
    pub flag_indices: HashMap<String, usize>,
}

/// Compiles a raw configuration document. Malformed individual flags
/// (failing [`FeatureFlag::is_well_formed`]) are kept in the table so
/// they still resolve to `PARSE_ERROR` at evaluation time (spec §7: a
/// single bad flag must not fail the whole update), but are logged and
/// excluded from the pre-evaluation cache.
pub fn compile(doc: &ConfigurationDocument, interpreter: &Interpreter) -> (CompiledState, StateUpdateResult) {
    let mut sorted_keys: Vec<&String> = doc.flags.keys().collect();
    sorted_keys.sort();

    let mut flags = HashMap::with_capacity(doc.flags.len());
    let mut index_order = Vec::with_capacity(doc.flags.len());
    let mut required_context_keys = HashMap::with_capacity(doc.flags.len());
    let mut flag_indices = HashMap::with_capacity(doc.flags.len());
    let mut pre_evaluated_count = 0usize;

    for (index, key) in sorted_keys.into_iter().enumerate() {
        let flag = doc.flags[key].clone();

        if !flag.is_well_formed() {
            warn!("flag {key} has a defaultVariant not present in its variants; keeping as a parse-error stub");
        }

        let required_keys: Vec<String> = flag
            .targeting
            .as_ref()
            .filter(|_| flag.state == FlagState::Enabled)
            .map(|rule| required_vars(rule))
            .unwrap_or_default();

        let mut compiled = CompiledFlag {
            flag,
            index,
            required_context_keys: required_keys.clone(),
            pre_evaluated: None,
        };

        if compiled.is_pure() && compiled.flag.is_well_formed() {
            let result = resolver::resolve(key, Some(&compiled.flag), &serde_json::json!({}), interpreter);
            compiled.pre_evaluated = Some(result);
            pre_evaluated_count += 1;
        }

        // Only targeted (non-pure) flags are reported in the
        // requiredContextKeys summary — static/disabled flags never
        // consult the context at all (spec §4.5).
        if !compiled.is_pure() {
            required_context_keys.insert(key.clone(), required_keys);
        }
        index_order.push(key.clone());
        flag_indices.insert(key.clone(), index);
        flags.insert(key.clone(), compiled);
    }

    let state = CompiledState { flags, index_order, metadata: doc.metadata.clone() };
    let summary = StateUpdateResult {
        success: true,
        pre_evaluated: pre_evaluated_count,
        required_context_keys,
        flag_indices,
    };

    (state, summary)
}

/// Statically scans a targeting rule tree for root-scope `var`
/// references and returns their top-level path segment (the part before
/// the first `.`), deduplicated, always including `targetingKey` (every
/// targeted flag consults it implicitly through context enrichment, even
/// when the rule itself never names it explicitly). `var` calls inside
/// the second operand of an accumulator operator
/// (`map`/`filter`/`reduce`/…) are skipped — they resolve against the
/// array element the accumulator is iterating over, not the root
/// context.
fn required_vars(rule: &serde_json::Value) -> Vec<String> {
    let mut keys = HashSet::new();
    scan(rule, false, &mut keys);
    keys.insert(resolver::TARGETING_KEY.to_string());
    let mut sorted: Vec<String> = keys.into_iter().collect();
    sorted.sort();
    sorted
}

fn scan(value: &serde_json::Value, in_accumulator_scope: bool, keys: &mut HashSet<String>) {
    let serde_json::Value::Object(map) = value else {
        if let serde_json::Value::Array(items) = value {
            for item in items {
                scan(item, in_accumulator_scope, keys);
            }
        }
        return;
    };

    // A rule node is `{operator: operand}`; plain data objects (e.g. the
    // object literal passed to `fractional`'s distribution pairs) won't
    // have exactly one entry whose value looks like an operand, but we
    // scan every entry's value regardless, which is safe either way.
    for (op, operand) in map {
        if op == "var" && !in_accumulator_scope {
            if let Some(path) = var_path(operand) {
                if let Some(root) = path.split('.').next() {
                    if !root.is_empty() {
                        keys.insert(root.to_string());
                    }
                }
            }
            continue;
        }

        if ACCUMULATOR_OPERATORS.contains(&op.as_str()) {
            if let serde_json::Value::Array(items) = operand {
                if let Some(data_expr) = items.first() {
                    scan(data_expr, in_accumulator_scope, keys);
                }
                for item_rule in items.iter().skip(1) {
                    scan(item_rule, true, keys);
                }
                continue;
            }
        }

        scan(operand, in_accumulator_scope, keys);
    }
}

/// `var`'s operand is either a bare path string, or `[path]`/`[path,
/// default]`.
fn var_path(operand: &serde_json::Value) -> Option<&str> {
    match operand {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> ConfigurationDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn indices_assigned_in_sorted_key_order() {
        let interp = Interpreter::new();
        let d = doc(
            r#"{"flags":{
                "zeta":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"},
                "alpha":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"},
                "mu":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"}
            }}"#,
        );
        let (state, summary) = compile(&d, &interp);
        assert_eq!(state.index_order, vec!["alpha", "mu", "zeta"]);
        assert_eq!(summary.flag_indices["alpha"], 0);
        assert_eq!(summary.flag_indices["mu"], 1);
        assert_eq!(summary.flag_indices["zeta"], 2);
        assert_eq!(state.by_index(0).unwrap().flag.default_variant, "on");
    }

    #[test]
    fn pure_flags_are_pre_evaluated() {
        let interp = Interpreter::new();
        let d = doc(
            r#"{"flags":{
                "disabled-flag":{"state":"DISABLED","variants":{"on":true,"off":false},"defaultVariant":"off"},
                "static-flag":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"},
                "targeted-flag":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"off",
                    "targeting":{"if":[{"==":[{"var":"tier"},"gold"]},"on","off"]}}
            }}"#,
        );
        let (state, summary) = compile(&d, &interp);
        assert_eq!(summary.pre_evaluated, 2);
        assert!(state.flags["disabled-flag"].pre_evaluated.is_some());
        assert!(state.flags["static-flag"].pre_evaluated.is_some());
        assert!(state.flags["targeted-flag"].pre_evaluated.is_none());
    }

    #[test]
    fn required_keys_follow_var_references() {
        let rule = serde_json::json!({"and": [
            {"==": [{"var": "tier"}, "gold"]},
            {"sem_ver": [{"var": "client.version"}, "^", "1.0.0"]}
        ]});
        let keys: Vec<String> = required_vars(&rule);
        assert_eq!(keys, vec!["client", "targetingKey", "tier"]);
    }

    #[test]
    fn accumulator_scope_vars_are_excluded() {
        let rule = serde_json::json!({"some": [
            {"var": "roles"},
            {"==": [{"var": ""}, "admin"]}
        ]});
        let keys = required_vars(&rule);
        assert_eq!(keys, vec!["roles", "targetingKey"]);
    }

    #[test]
    fn required_context_keys_are_reported_per_flag() {
        let interp = Interpreter::new();
        let d = doc(
            r#"{"flags":{
                "f":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"off",
                    "targeting":{"==": [{"var":"tier"}, "gold"]}}
            }}"#,
        );
        let (_, summary) = compile(&d, &interp);
        assert_eq!(summary.required_context_keys["f"], vec!["targetingKey".to_string(), "tier".to_string()]);
    }

    #[test]
    fn static_flags_are_absent_from_required_context_keys() {
        let interp = Interpreter::new();
        let d = doc(
            r#"{"flags":{
                "static-flag":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"}
            }}"#,
        );
        let (_, summary) = compile(&d, &interp);
        assert!(!summary.required_context_keys.contains_key("static-flag"));
    }

    #[test]
    fn malformed_flag_is_not_pre_evaluated_but_stays_in_the_table() {
        let interp = Interpreter::new();
        let d = doc(
            r#"{"flags":{
                "broken":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"missing"}
            }}"#,
        );
        let (state, summary) = compile(&d, &interp);
        assert!(state.flags.contains_key("broken"));
        assert!(state.flags["broken"].pre_evaluated.is_none());
        assert_eq!(summary.pre_evaluated, 0);
        assert!(summary.success);
    }
}

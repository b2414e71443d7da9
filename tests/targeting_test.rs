//! End-to-end scenarios against the public facade, covering the
//! concrete examples of spec §8 plus a few of the universal invariants
//! that only show up once a real configuration document is published.

use flagd_evaluation_engine::{ErrorCode, FlagEvaluator, ResolutionReason};
use serde_json::json;
use test_log::test;

fn targeting_config() -> &'static str {
    r#"{
        "flags": {
            "fractional-flag": {
                "state": "ENABLED",
                "variants": { "red": "red-value", "blue": "blue-value" },
                "defaultVariant": "red",
                "targeting": {
                    "fractional": [
                        { "cat": [{ "var": "$flagd.flagKey" }, { "var": "email" }] },
                        ["red", 30],
                        ["blue", 70]
                    ]
                }
            },
            "semver-flag": {
                "state": "ENABLED",
                "variants": { "new": "new-value", "old": "old-value" },
                "defaultVariant": "old",
                "targeting": {
                    "if": [{ "sem_ver": [{ "var": "version" }, ">=", "2.0.0"] }, "new", "old"]
                }
            },
            "email-domain-flag": {
                "state": "ENABLED",
                "variants": { "internal": true, "external": false },
                "defaultVariant": "external",
                "targeting": {
                    "if": [{ "ends_with": [{ "var": "email" }, "@company.com"] }, "internal", "external"]
                }
            }
        }
    }"#
}

#[test]
fn fractional_distribution_converges_to_its_weights() {
    let engine = FlagEvaluator::new();
    engine.update_state(targeting_config()).unwrap();

    let iterations = 500;
    let mut blue_count = 0;
    for i in 0..iterations {
        let email = format!("user{i}@example.com");
        let ctx = json!({"targetingKey": "user-1", "email": email});
        let result = engine.evaluate_string("fractional-flag", &ctx, "red-value");
        if result == "blue-value" {
            blue_count += 1;
        }
    }

    // weights are 30/70; 500 samples gives ample margin for a 3-sigma band.
    let ratio = blue_count as f64 / iterations as f64;
    assert!((0.55..=0.85).contains(&ratio), "blue ratio {ratio} drifted from its 0.70 weight");
}

#[test]
fn semver_targeting_picks_the_newer_variant() {
    let engine = FlagEvaluator::new();
    engine.update_state(targeting_config()).unwrap();

    let newer = engine.evaluate("semver-flag", &json!({"version": "2.1.0"}));
    assert_eq!(newer.value, json!("new-value"));
    assert_eq!(newer.reason, ResolutionReason::TargetingMatch);

    let older = engine.evaluate("semver-flag", &json!({"version": "1.9.0"}));
    assert_eq!(older.value, json!("old-value"));
}

#[test]
fn ends_with_targeting_distinguishes_email_domains() {
    let engine = FlagEvaluator::new();
    engine.update_state(targeting_config()).unwrap();

    let internal = engine.evaluate_bool("email-domain-flag", &json!({"email": "employee@company.com"}), false);
    assert!(internal);

    let external = engine.evaluate_bool("email-domain-flag", &json!({"email": "user@external.com"}), true);
    assert!(!external);
}

#[test]
fn static_boolean_flag_end_to_end() {
    let engine = FlagEvaluator::new();
    engine
        .update_state(r#"{"flags":{"f":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"on"}}}"#)
        .unwrap();

    let result = engine.evaluate("f", &json!({}));
    assert_eq!(result.value, json!(true));
    assert_eq!(result.variant, "on");
    assert_eq!(result.reason, ResolutionReason::Static);
}

#[test]
fn disabled_flag_end_to_end() {
    let engine = FlagEvaluator::new();
    engine
        .update_state(r#"{"flags":{"f":{"state":"DISABLED","variants":{"on":true,"off":false},"defaultVariant":"on"}}}"#)
        .unwrap();

    let result = engine.evaluate("f", &json!({}));
    assert_eq!(result.reason, ResolutionReason::Disabled);
    assert_eq!(result.value, json!(true));
    assert_eq!(result.variant, "on");
}

#[test]
fn missing_flag_reports_flag_not_found_and_typed_accessors_fall_back() {
    let engine = FlagEvaluator::new();
    let result = engine.evaluate("nope", &json!({}));
    assert_eq!(result.reason, ResolutionReason::Error);
    assert_eq!(result.error_code, Some(ErrorCode::FlagNotFound));
    assert!(engine.evaluate_bool("nope", &json!({}), true));
}

#[test]
fn required_context_keys_are_minimal_for_a_targeted_flag() {
    let engine = FlagEvaluator::new();
    let summary = engine.update_state(targeting_config()).unwrap();

    let full_context = json!({
        "email": "employee@company.com",
        "unrelated_secret": "shhh",
        "another_unrelated_field": 42,
    });
    let with_extra = engine.evaluate("email-domain-flag", &full_context);

    let restricted = json!({"email": "employee@company.com"});
    let without_extra = engine.evaluate("email-domain-flag", &restricted);

    assert_eq!(with_extra.value, without_extra.value);
    assert!(summary.required_context_keys["email-domain-flag"].contains(&"email".to_string()));
    assert!(!summary.required_context_keys["email-domain-flag"].contains(&"unrelated_secret".to_string()));
}

#[test]
fn state_update_is_a_full_replacement() {
    let engine = FlagEvaluator::new();
    engine
        .update_state(r#"{"flags":{"a":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"}}}"#)
        .unwrap();
    assert!(engine.evaluate("a", &json!({})).error_code.is_none());

    engine
        .update_state(r#"{"flags":{"b":{"state":"ENABLED","variants":{"on":true},"defaultVariant":"on"}}}"#)
        .unwrap();

    // "a" is gone: the second update_state replaced the whole table, not merged into it.
    assert_eq!(engine.evaluate("a", &json!({})).error_code, Some(ErrorCode::FlagNotFound));
    assert!(engine.evaluate("b", &json!({})).error_code.is_none());
}

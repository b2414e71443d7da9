//! The flag data model (spec §3) and the raw configuration-document shape
//! (spec §6) that `update_state` accepts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `state` field of a flag, as carried verbatim in the JSON config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagState {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "DISABLED")]
    Disabled,
}

/// A single flag entry, deserialized straight from the `flags` map of a
/// configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub state: FlagState,
    pub variants: HashMap<String, serde_json::Value>,
    pub default_variant: String,
    #[serde(default)]
    pub targeting: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FeatureFlag {
    /// §3 invariant: `defaultVariant` must name an entry in `variants`.
    pub fn is_well_formed(&self) -> bool {
        self.variants.contains_key(&self.default_variant)
    }

    pub fn default_value(&self) -> Option<&serde_json::Value> {
        self.variants.get(&self.default_variant)
    }
}

/// Top-level configuration document accepted by `update_state` (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationDocument {
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub flags: HashMap<String, FeatureFlag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_document() {
        let doc: ConfigurationDocument = serde_json::from_str(
            r#"{"flags":{"f":{"state":"ENABLED","variants":{"on":true,"off":false},"defaultVariant":"on"}}}"#,
        )
        .unwrap();
        let flag = &doc.flags["f"];
        assert_eq!(flag.state, FlagState::Enabled);
        assert!(flag.is_well_formed());
        assert_eq!(flag.default_value(), Some(&serde_json::json!(true)));
    }

    #[test]
    fn detects_malformed_default_variant() {
        let flag: FeatureFlag = serde_json::from_str(
            r#"{"state":"ENABLED","variants":{"on":true},"defaultVariant":"missing"}"#,
        )
        .unwrap();
        assert!(!flag.is_well_formed());
    }
}

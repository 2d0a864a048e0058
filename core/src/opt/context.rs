//! file: core/src/opt/context.rs
//! description: immutable per-run configuration handed to every pass.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Fail-closed switches for the non-escape analysis. Every flag defaults to
/// the conservative answer (`true`, i.e. "assume it escapes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonEscapePolicy {
    pub unknown_call_escape: bool,
    pub unknown_attr_call_escape: bool,
    pub global_write_escape: bool,
    pub return_escape_by_default: bool,
    pub yield_escape_by_default: bool,
}

impl Default for NonEscapePolicy {
    fn default() -> Self {
        Self {
            unknown_call_escape: true,
            unknown_attr_call_escape: true,
            global_write_escape: true,
            return_escape_by_default: true,
            yield_escape_by_default: true,
        }
    }
}

impl NonEscapePolicy {
    /// Builds a policy from loosely-typed user input. Only JSON booleans
    /// override a default; unknown keys and other value types are ignored.
    pub fn normalize(overrides: Option<&serde_json::Map<String, JsonValue>>) -> Self {
        let mut policy = NonEscapePolicy::default();
        let Some(overrides) = overrides else {
            return policy;
        };
        for (key, value) in overrides {
            let Some(flag) = value.as_bool() else {
                continue;
            };
            match key.as_str() {
                "unknown_call_escape" => policy.unknown_call_escape = flag,
                "unknown_attr_call_escape" => policy.unknown_attr_call_escape = flag,
                "global_write_escape" => policy.global_write_escape = flag,
                "return_escape_by_default" => policy.return_escape_by_default = flag,
                "yield_escape_by_default" => policy.yield_escape_by_default = flag,
                _ => {}
            }
        }
        policy
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassContext {
    pub opt_level: u8,
    pub target_lang: String,
    pub debug_flags: serde_json::Map<String, JsonValue>,
    pub enabled_passes: BTreeSet<String>,
    pub disabled_passes: BTreeSet<String>,
    pub non_escape_policy: NonEscapePolicy,
}

impl Default for PassContext {
    fn default() -> Self {
        Self {
            opt_level: 1,
            target_lang: String::new(),
            debug_flags: serde_json::Map::new(),
            enabled_passes: BTreeSet::new(),
            disabled_passes: BTreeSet::new(),
            non_escape_policy: NonEscapePolicy::default(),
        }
    }
}

impl PassContext {
    pub fn with_opt_level(opt_level: u8) -> Self {
        Self { opt_level, ..Self::default() }
    }

    /// Whether a debug flag is set to a truthy JSON value.
    pub fn debug_flag(&self, name: &str) -> bool {
        match self.debug_flags.get(name) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(JsonValue::String(s)) => !s.is_empty(),
            _ => false,
        }
    }
}

//! Nodes of kinds the typed model does not cover.
//!
//! The front-end and per-target lowerings keep adding node kinds (`Box`,
//! `ObjLen`, `IsInstance`, ...). Such nodes are carried through untouched:
//! the payload is kept as raw JSON and written back verbatim. Analyses that
//! meet one treat it as arbitrary code.

use std::collections::BTreeSet;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueNode {
    pub kind: String,
    /// Every field of the node except `kind`.
    pub fields: Map<String, JsonValue>,
}

impl OpaqueNode {
    /// Splits `kind` off a raw node object.
    pub fn from_fields(mut fields: Map<String, JsonValue>) -> Self {
        let kind = match fields.remove("kind") {
            Some(JsonValue::String(kind)) => kind,
            _ => String::new(),
        };
        Self { kind, fields }
    }

    /// Identifiers of every `Name` node nested anywhere in the payload.
    pub fn name_ids(&self, out: &mut BTreeSet<String>) {
        for value in self.fields.values() {
            collect_names(value, out);
        }
    }

    /// Every target name bound inside the payload. Any `Name` could be a
    /// store, so this is the same set as [`OpaqueNode::name_ids`] plus
    /// string-valued `arg_order` entries of nested lambdas and functions.
    pub fn bound_names(&self, out: &mut BTreeSet<String>) {
        self.name_ids(out);
        for value in self.fields.values() {
            collect_arg_orders(value, out);
        }
    }
}

fn collect_names(value: &JsonValue, out: &mut BTreeSet<String>) {
    match value {
        JsonValue::Array(items) => items.iter().for_each(|item| collect_names(item, out)),
        JsonValue::Object(map) => {
            if map.get("kind").and_then(JsonValue::as_str) == Some("Name") {
                if let Some(id) = map.get("id").and_then(JsonValue::as_str).filter(|id| !id.is_empty()) {
                    out.insert(id.to_string());
                }
            }
            map.values().for_each(|item| collect_names(item, out));
        }
        _ => {}
    }
}

fn collect_arg_orders(value: &JsonValue, out: &mut BTreeSet<String>) {
    match value {
        JsonValue::Array(items) => items.iter().for_each(|item| collect_arg_orders(item, out)),
        JsonValue::Object(map) => {
            if let Some(JsonValue::Array(args)) = map.get("arg_order") {
                out.extend(args.iter().filter_map(JsonValue::as_str).map(str::to_string));
            }
            map.values().for_each(|item| collect_arg_orders(item, out));
        }
        _ => {}
    }
}

impl Serialize for OpaqueNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("kind", &self.kind)?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Reads a node object, keeping it opaque when its `kind` is not one of
/// `known`; otherwise hands the object to `typed`.
pub(crate) fn split_known<T, E: serde::de::Error>(
    fields: Map<String, JsonValue>,
    known: &[&str],
    typed: impl FnOnce(JsonValue) -> Result<T, serde_json::Error>,
    opaque: impl FnOnce(OpaqueNode) -> T,
) -> Result<T, E> {
    let kind = fields.get("kind").and_then(JsonValue::as_str).unwrap_or_default();
    if kind.is_empty() {
        return Err(E::missing_field("kind"));
    }
    if known.contains(&kind) {
        typed(JsonValue::Object(fields)).map_err(E::custom)
    } else {
        Ok(opaque(OpaqueNode::from_fields(fields)))
    }
}

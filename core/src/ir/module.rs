//! file: core/src/ir/module.rs
//! description: EAST3 module documents and their metadata.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{East3ErrorExt, Level};
use crate::ir::annotation::EscapeSummary;
use crate::ir::err::DocumentError;
use crate::ir::stmt::Stmt;
use crate::ir::symbol::Symbol;

/// The IR stage this optimizer consumes.
pub const EAST_STAGE: u32 = 3;

/// Fallback id for documents that carry neither `module_id` nor a path.
pub const ANONYMOUS_MODULE_ID: &str = "__module__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentKind {
    #[default]
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    /// `import a.b as c` binds `c` to the module `a.b`.
    Module,
    /// `from a.b import f as g` binds `g` to the symbol `a.b::f`.
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub module_id: String,
    #[serde(default)]
    pub export_name: String,
    pub local_name: String,
    pub binding_kind: BindingKind,
}

impl ImportBinding {
    pub fn module(module_id: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            export_name: String::new(),
            local_name: local_name.into(),
            binding_kind: BindingKind::Module,
        }
    }

    pub fn symbol(
        module_id: impl Into<String>,
        export_name: impl Into<String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            export_name: export_name.into(),
            local_name: local_name.into(),
            binding_kind: BindingKind::Symbol,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import_bindings: Vec<ImportBinding>,
    /// Dependency documents supplied up front by the caller, keyed by module id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub non_escape_import_closure: BTreeMap<String, Module>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_escape_summary: Option<BTreeMap<Symbol, EscapeSummary>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// One EAST3 module document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub kind: DocumentKind,
    pub east_stage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub meta: ModuleMeta,
}

impl Module {
    pub fn new(module_id: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            kind: DocumentKind::Module,
            east_stage: EAST_STAGE,
            source_path: None,
            body,
            meta: ModuleMeta { module_id: module_id.into(), ..ModuleMeta::default() },
        }
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_import(mut self, binding: ImportBinding) -> Self {
        self.meta.import_bindings.push(binding);
        self
    }

    /// Module id of this document: `meta.module_id`, else the file stem of
    /// `source_path`, else [`ANONYMOUS_MODULE_ID`].
    pub fn module_id(&self) -> String {
        let explicit = self.meta.module_id.trim();
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        self.source_path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem())
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| ANONYMOUS_MODULE_ID.to_string())
    }

    /// Parses a document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Module, Box<dyn East3ErrorExt>> {
        let value: JsonValue = serde_json::from_str(text).map_err(|e| {
            Box::new(DocumentError::with(
                Level::Error,
                format!("invalid JSON: {}", e),
                "east3.ir.module.from_json_str".into(),
                None,
            )) as Box<dyn East3ErrorExt>
        })?;
        module_from_value(value)
    }

    pub fn to_json_string(&self) -> Result<String, Box<dyn East3ErrorExt>> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Box::new(DocumentError::with(
                Level::Error,
                format!("failed to serialize EAST3 document: {}", e),
                "east3.ir.module.to_json_string".into(),
                None,
            )) as Box<dyn East3ErrorExt>
        })
    }

    /// Checks the document can be handed to the optimizer.
    pub fn validate(&self) -> Result<(), Box<dyn East3ErrorExt>> {
        if self.east_stage != EAST_STAGE {
            let location = self.source_path.clone().map(crate::location::Location::file);
            return Err(Box::new(DocumentError::with(
                Level::Error,
                format!(
                    "unsupported east_stage: expected {}, got {}",
                    EAST_STAGE, self.east_stage
                ),
                "east3.ir.module.validate".into(),
                location,
            )));
        }
        Ok(())
    }
}

/// Parses a JSON value into a document, reporting anything that is not a
/// well-formed module root.
pub fn module_from_value(value: JsonValue) -> Result<Module, Box<dyn East3ErrorExt>> {
    if value.get("kind").and_then(JsonValue::as_str) != Some("Module") {
        return Err(Box::new(DocumentError::with(
            Level::Error,
            "document root must be a Module node".into(),
            "east3.ir.module.module_from_value".into(),
            None,
        )));
    }
    serde_json::from_value(value).map_err(|e| {
        Box::new(DocumentError::with(
            Level::Error,
            format!("malformed EAST3 document: {}", e),
            "east3.ir.module.module_from_value".into(),
            None,
        )) as Box<dyn East3ErrorExt>
    })
}

//! file: core/src/opt/optimize.rs
//! description: public entry point tying option parsing, validation and the
//! pass manager together.

use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::East3ErrorExt;
use crate::ir::Module;
use crate::opt::context::{NonEscapePolicy, PassContext};
use crate::opt::err::OptimizerError;
use crate::opt::manager::{PassManager, PassTrace};
use crate::opt::passes::default_pass_manager;

/// An optimization level as supplied by a caller: already numeric, or raw
/// command-line text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptLevelArg {
    Level(i64),
    Text(String),
}

impl Default for OptLevelArg {
    fn default() -> Self {
        OptLevelArg::Text(String::new())
    }
}

impl From<i64> for OptLevelArg {
    fn from(level: i64) -> Self {
        OptLevelArg::Level(level)
    }
}

impl From<&str> for OptLevelArg {
    fn from(text: &str) -> Self {
        OptLevelArg::Text(text.to_string())
    }
}

impl From<String> for OptLevelArg {
    fn from(text: String) -> Self {
        OptLevelArg::Text(text)
    }
}

/// Normalizes an optimization level. Empty text means level 1.
pub fn resolve_opt_level(value: &OptLevelArg) -> Result<u8, Box<dyn East3ErrorExt>> {
    const ISSUER: &str = "east3.opt.optimize.resolve_opt_level";
    let level = match value {
        OptLevelArg::Level(level) => *level,
        OptLevelArg::Text(text) => match text.trim() {
            "" => 1,
            "0" => 0,
            "1" => 1,
            "2" => 2,
            other => return Err(OptimizerError::boxed(format!("invalid opt level: {}", other), ISSUER)),
        },
    };
    match u8::try_from(level) {
        Ok(level) if level <= 2 => Ok(level),
        _ => Err(OptimizerError::boxed(format!("invalid opt level: {}", level), ISSUER)),
    }
}

fn is_pass_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expands `"+PassA,-PassB"` into `(enabled, disabled)`. Later tokens win
/// over earlier contrary ones.
pub fn parse_opt_pass_overrides(
    spec: &str,
) -> Result<(BTreeSet<String>, BTreeSet<String>), Box<dyn East3ErrorExt>> {
    let mut enabled = BTreeSet::new();
    let mut disabled = BTreeSet::new();

    for raw in spec.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            continue;
        }
        let invalid = || {
            OptimizerError::boxed(
                format!("invalid opt pass token: {}", item),
                "east3.opt.optimize.parse_opt_pass_overrides",
            )
        };
        let mut chars = item.chars();
        let sign = chars.next();
        let name = chars.as_str().trim();
        if !is_pass_name(name) {
            return Err(invalid());
        }
        match sign {
            Some('+') => {
                disabled.remove(name);
                enabled.insert(name.to_string());
            }
            Some('-') => {
                enabled.remove(name);
                disabled.insert(name.to_string());
            }
            _ => return Err(invalid()),
        }
    }

    Ok((enabled, disabled))
}

/// Caller-facing knobs for [`optimize_document`].
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub opt_level: OptLevelArg,
    pub target_lang: String,
    /// Comma separated `+Pass` / `-Pass` overrides.
    pub opt_pass_spec: String,
    pub debug_flags: serde_json::Map<String, JsonValue>,
    /// Raw non-escape policy overrides, normalized fail-closed.
    pub non_escape_policy: Option<serde_json::Map<String, JsonValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub changed: bool,
    pub change_count: usize,
    pub warnings: Vec<String>,
    pub elapsed_ms: f64,
    pub trace: Vec<PassTrace>,
    pub opt_level: u8,
    pub target_lang: String,
    pub enabled_passes: Vec<String>,
    pub disabled_passes: Vec<String>,
    pub non_escape_policy: NonEscapePolicy,
}

/// Builds the pass context for `options`, validating level and overrides.
pub fn build_pass_context(options: &OptimizeOptions) -> Result<PassContext, Box<dyn East3ErrorExt>> {
    let opt_level = resolve_opt_level(&options.opt_level)?;
    let (enabled_passes, disabled_passes) = parse_opt_pass_overrides(&options.opt_pass_spec)?;
    Ok(PassContext {
        opt_level,
        target_lang: options.target_lang.clone(),
        debug_flags: options.debug_flags.clone(),
        enabled_passes,
        disabled_passes,
        non_escape_policy: NonEscapePolicy::normalize(options.non_escape_policy.as_ref()),
    })
}

/// Optimizes `document` in place and returns the run report.
///
/// Uses the default pass pipeline unless `pass_manager` is given.
pub fn optimize_document(
    document: &mut Module,
    options: &OptimizeOptions,
    pass_manager: Option<&PassManager>,
) -> Result<OptimizeReport, Box<dyn East3ErrorExt>> {
    document.validate()?;
    let context = build_pass_context(options)?;

    let default_manager;
    let manager = match pass_manager {
        Some(manager) => manager,
        None => {
            default_manager = default_pass_manager();
            &default_manager
        }
    };

    info!(
        "optimizing module {} (opt_level={}, target_lang={})",
        document.module_id(),
        context.opt_level,
        context.target_lang
    );
    let (summary, trace) = manager.run(document, &context)?;

    Ok(OptimizeReport {
        changed: summary.changed,
        change_count: summary.change_count,
        warnings: summary.warnings,
        elapsed_ms: summary.elapsed_ms,
        trace,
        opt_level: context.opt_level,
        target_lang: context.target_lang,
        enabled_passes: context.enabled_passes.into_iter().collect(),
        disabled_passes: context.disabled_passes.into_iter().collect(),
        non_escape_policy: context.non_escape_policy,
    })
}

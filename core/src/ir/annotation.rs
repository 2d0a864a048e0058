//! Analysis results the optimizer writes back into the document.

use serde::{Deserialize, Serialize};

use crate::ir::expr::Expr;
use crate::ir::symbol::Symbol;

/// Per-function escape facts. Booleans only ever move from `false` to
/// `true` while the summary is being solved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeSummary {
    pub symbol: Symbol,
    pub arg_order: Vec<String>,
    pub arg_escape: Vec<bool>,
    pub return_escape: bool,
    pub return_from_args: Vec<bool>,
    pub unresolved_calls: usize,
}

/// Escape facts attached to a single call node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsiteAnnotation {
    /// Resolved callee symbol text, empty when the call could not be resolved.
    pub callee: String,
    pub resolved: bool,
    pub in_return_expr: bool,
    pub arg_sources: Vec<Vec<usize>>,
    pub callee_arg_escape: Vec<bool>,
    pub callee_return_from_args: Vec<bool>,
    pub callee_return_escape: bool,
}

pub const RESERVE_HINT_KIND: &str = "StaticRangeReserveHint";
pub const RESERVE_COUNT_KIND: &str = "static_range_trip_count";
pub const RESERVE_COUNT_EXPR_VERSION: &str = "east3_expr_v1";
pub const RESERVE_SAFETY: &str = "proven_unconditional_append";

/// Tells an emitter it may pre-size `owner` to `count_expr` elements
/// before entering the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveHint {
    pub kind: String,
    pub owner: String,
    pub count_kind: String,
    pub count_expr_version: String,
    pub count_expr: Expr,
    pub safe: bool,
    pub safety: String,
}

impl ReserveHint {
    pub fn static_range(owner: impl Into<String>, count_expr: Expr) -> Self {
        Self {
            kind: RESERVE_HINT_KIND.to_string(),
            owner: owner.into(),
            count_kind: RESERVE_COUNT_KIND.to_string(),
            count_expr_version: RESERVE_COUNT_EXPR_VERSION.to_string(),
            count_expr,
            safe: true,
            safety: RESERVE_SAFETY.to_string(),
        }
    }
}

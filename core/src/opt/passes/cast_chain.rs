//! file: core/src/opt/passes/cast_chain.rs
//! description: drops numeric conversions whose source already has the
//! target type.
//!
//! Two shapes are reduced: a builtin-lowered `static_cast` with a single
//! argument, and an `Unbox` node (carried opaquely) around a numeric
//! value. Both need a known numeric type on each side; `int`/`float` are
//! compared as `int64`/`float64`, and `object` or unknown sources are kept.

use serde_json::Value as JsonValue;

use crate::error::East3ErrorExt;
use crate::ir::expr::{Expr, ExprKind, canonical_numeric_type};
use crate::ir::walk::rewrite_stmts_exprs;
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

fn same_numeric_type(dst: Option<String>, src: Option<&str>) -> bool {
    match (dst, canonical_numeric_type(src)) {
        (Some(dst), Some(src)) => dst == src,
        _ => false,
    }
}

fn reduce_static_cast(expr: &mut Expr) -> bool {
    if !expr.is_builtin_runtime_call("static_cast") {
        return false;
    }
    let ExprKind::Call { args, .. } = &mut expr.kind else {
        return false;
    };
    if args.len() != 1 {
        return false;
    }
    let dst = canonical_numeric_type(expr.resolved_type.as_deref());
    if !same_numeric_type(dst, args[0].resolved_type.as_deref()) {
        return false;
    }
    *expr = args.remove(0);
    true
}

/// Unwraps an `Unbox` whose value is already of the unboxed type. The
/// target type comes from the node's `target` field, falling back to its
/// resolved type. Returns how many nodes were reduced, the unbox included.
fn reduce_unbox(expr: &mut Expr) -> usize {
    let ExprKind::Opaque(node) = &expr.kind else {
        return 0;
    };
    if node.kind != "Unbox" {
        return 0;
    }
    let Some(raw) = node.fields.get("value").filter(|v| v.is_object()) else {
        return 0;
    };
    let Ok(mut value) = serde_json::from_value::<Expr>(raw.clone()) else {
        return 0;
    };
    let dst = canonical_numeric_type(node.fields.get("target").and_then(JsonValue::as_str))
        .or_else(|| canonical_numeric_type(expr.resolved_type.as_deref()));
    if !same_numeric_type(dst, value.resolved_type.as_deref()) {
        return 0;
    }
    let inner = reduce_expr(&mut value);
    *expr = value;
    inner + 1
}

fn reduce_expr(expr: &mut Expr) -> usize {
    let mut count: usize = expr.children_mut().into_iter().map(reduce_expr).sum();
    if reduce_static_cast(expr) {
        count += 1;
    }
    count + reduce_unbox(expr)
}

pub struct NumericCastChainReductionPass;

impl East3OptimizerPass for NumericCastChainReductionPass {
    fn name(&self) -> &'static str {
        "NumericCastChainReductionPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        Ok(PassResult::from_count(rewrite_stmts_exprs(&mut document.body, &mut reduce_expr)))
    }
}

//! file: core/src/opt/passes/literal_cast_fold.rs
//! description: folds `static_cast` of a literal that already has the
//! target type.

use crate::error::East3ErrorExt;
use crate::ir::expr::{Expr, ExprKind, normalize_type_name};
use crate::ir::walk::rewrite_stmts_exprs;
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

/// Replaces `expr` by its literal argument when the cast is a no-op. The
/// folded literal keeps the call's source text.
fn try_fold(expr: &mut Expr) -> bool {
    let ExprKind::Call { lowered_kind, runtime_call, args, .. } = &mut expr.kind else {
        return false;
    };
    if lowered_kind.as_deref() != Some("BuiltinCall") || runtime_call.as_deref() != Some("static_cast") {
        return false;
    }
    let [arg] = args.as_slice() else {
        return false;
    };
    if !matches!(arg.kind, ExprKind::Constant { .. }) {
        return false;
    }
    let target = normalize_type_name(expr.resolved_type.as_deref());
    let source = normalize_type_name(arg.resolved_type.as_deref());
    if target == "unknown" || source == "unknown" || target != source {
        return false;
    }

    let mut folded = args.remove(0);
    if let Some(repr) = expr.repr.take().filter(|r| !r.is_empty()) {
        folded.repr = Some(repr);
    }
    *expr = folded;
    true
}

fn fold_expr(expr: &mut Expr) -> usize {
    let mut count: usize = expr.children_mut().into_iter().map(fold_expr).sum();
    if try_fold(expr) {
        count += 1;
    }
    count
}

/// `int(42)` lowered to `static_cast` over an `int64` literal becomes the
/// literal itself. Casts that change the type are left alone.
pub struct LiteralCastFoldPass;

impl East3OptimizerPass for LiteralCastFoldPass {
    fn name(&self) -> &'static str {
        "LiteralCastFoldPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        Ok(PassResult::from_count(rewrite_stmts_exprs(&mut document.body, &mut fold_expr)))
    }
}

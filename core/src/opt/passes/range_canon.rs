//! file: core/src/opt/passes/range_canon.rs
//! description: turns runtime `for x in range(...)` loops into static ranges.

use crate::error::East3ErrorExt;
use crate::ir::expr::{Expr, ExprKind, is_int_like_type};
use crate::ir::stmt::{ForCore, IterPlan, Stmt, TargetPlan};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

pub const STATIC_FASTPATH: &str = "static_fastpath";

fn is_range_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { runtime_call, lowered_kind, builtin_name, .. } => {
            runtime_call.as_deref() == Some("py_range")
                || (lowered_kind.as_deref() == Some("BuiltinCall")
                    && builtin_name.as_deref() == Some("range"))
        }
        _ => false,
    }
}

fn is_int_operand(expr: &Expr) -> bool {
    expr.const_int().is_some() || is_int_like_type(expr.resolved_type.as_deref())
}

/// Static plan equivalent to the runtime plan of `fc`, if one is provable.
fn static_plan_for(fc: &ForCore) -> Option<IterPlan> {
    let IterPlan::RuntimeIterForPlan { iter_expr } = &fc.iter_plan else {
        return None;
    };
    match &fc.target_plan {
        TargetPlan::NameTarget { id, .. } if !id.is_empty() => {}
        _ => return None,
    }
    if !is_range_call(iter_expr) {
        return None;
    }
    let ExprKind::Call { args, keywords, .. } = &iter_expr.kind else {
        return None;
    };
    if args.is_empty() || args.len() > 3 || !keywords.is_empty() {
        return None;
    }
    if !args.iter().all(is_int_operand) {
        return None;
    }

    let (start, stop, step) = match args.as_slice() {
        [stop] => (Expr::int(0), stop.clone(), Expr::int(1)),
        [start, stop] => (start.clone(), stop.clone(), Expr::int(1)),
        [start, stop, step] => (start.clone(), stop.clone(), step.clone()),
        _ => return None,
    };
    let step_value = step.const_int().filter(|v| *v != 0)?;
    let range_mode = if step_value > 0 { "ascending" } else { "descending" };

    Some(IterPlan::StaticRangeForPlan { start, stop, step, range_mode: range_mode.to_string() })
}

fn visit_block(stmts: &mut [Stmt]) -> usize {
    let mut count = 0;
    for stmt in stmts.iter_mut() {
        if let Stmt::ForCore(fc) = stmt {
            if let Some(plan) = static_plan_for(fc) {
                fc.iter_plan = plan;
                fc.iter_mode = STATIC_FASTPATH.to_string();
                count += 1;
            }
        }
        for block in stmt.blocks_mut() {
            count += visit_block(block);
        }
    }
    count
}

/// Rewrites `RuntimeIterForPlan` loops over `range(...)` with integer
/// bounds and a constant non-zero step into `StaticRangeForPlan` loops.
pub struct RangeForCanonicalizationPass;

impl East3OptimizerPass for RangeForCanonicalizationPass {
    fn name(&self) -> &'static str {
        "RangeForCanonicalizationPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        Ok(PassResult::from_count(visit_block(&mut document.body)))
    }
}

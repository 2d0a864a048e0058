//! Loop facts shared by the hoisting passes.

use std::collections::BTreeSet;

use crate::ir::expr::{Expr, ExprKind};
use crate::ir::stmt::{ForCore, IterPlan};

/// Builtins that can observe or rebind locals behind the analysis' back.
pub const DYNAMIC_NAME_CALLS: [&str; 5] = ["locals", "globals", "vars", "eval", "exec"];

/// Whether `expr` evaluates to the same value on every iteration: numeric
/// literals, names the loop never rebinds, `+x`/`-x`, and `+ - * /` of
/// such operands.
pub fn is_invariant(expr: &Expr, loop_vars: &BTreeSet<String>, mutated: &BTreeSet<String>) -> bool {
    match &expr.kind {
        ExprKind::Constant { .. } => expr.is_numeric_constant(),
        ExprKind::Name { id } => !id.is_empty() && !loop_vars.contains(id) && !mutated.contains(id),
        ExprKind::UnaryOp { op, operand } => {
            matches!(op.as_str(), "UAdd" | "USub") && is_invariant(operand, loop_vars, mutated)
        }
        ExprKind::BinOp { op, left, right } => {
            matches!(op.as_str(), "Add" | "Sub" | "Mult" | "Div")
                && is_invariant(left, loop_vars, mutated)
                && is_invariant(right, loop_vars, mutated)
        }
        _ => false,
    }
}

/// Names bound by the loop's target plan.
pub fn loop_vars(fc: &ForCore) -> BTreeSet<String> {
    let mut names = Vec::new();
    fc.target_plan.names(&mut names);
    names.into_iter().collect()
}

/// Whether a static range with literal bounds runs at least once.
pub fn is_statically_non_empty(plan: &IterPlan) -> bool {
    let IterPlan::StaticRangeForPlan { start, stop, step, .. } = plan else {
        return false;
    };
    match (start.const_int(), stop.const_int(), step.const_int()) {
        (Some(start), Some(stop), Some(step)) if step > 0 => start < stop,
        (Some(start), Some(stop), Some(step)) if step < 0 => start > stop,
        _ => false,
    }
}

//! file: core/src/opt/passes/reserve_hint.rs
//! description: attaches pre-size hints to static loops that append to one
//! container exactly once per iteration.

use std::collections::BTreeSet;

use crate::error::East3ErrorExt;
use crate::ir::annotation::ReserveHint;
use crate::ir::expr::{Expr, ExprKind};
use crate::ir::stmt::{ForCore, IterPlan, Stmt};
use crate::ir::walk::{collect_assigned_names, contains_opaque};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeMode {
    Ascending,
    Descending,
}

fn int_typed(expr: Expr) -> Expr {
    expr.with_type("int64").with_borrow("value")
}

fn binop(op: &str, left: Expr, right: Expr) -> Expr {
    int_typed(Expr::binop(op, left, right))
}

/// Closed-form trip count of `range(start, stop, step)` that is never
/// negative: `0 if <empty> else <count>`.
pub fn static_range_trip_count(start: &Expr, stop: &Expr, step: i64) -> Option<Expr> {
    if step == 0 {
        return None;
    }
    let mode = if step > 0 { RangeMode::Ascending } else { RangeMode::Descending };
    Some(trip_count_expr(start, stop, step.unsigned_abs(), mode))
}

fn trip_count_expr(start: &Expr, stop: &Expr, step_abs: u64, mode: RangeMode) -> Expr {
    // `hi - lo` is the distance covered; the loop is empty when `stop` has
    // not moved past `start` in the iteration direction
    let (hi, lo, empty_op) = match mode {
        RangeMode::Ascending => (stop, start, "LtE"),
        RangeMode::Descending => (start, stop, "GtE"),
    };
    let test = Expr::compare(empty_op, stop.clone(), start.clone())
        .with_type("bool")
        .with_borrow("value");

    let positive = if step_abs == 1 {
        if lo.const_int() == Some(0) {
            hi.clone()
        } else {
            binop("Sub", hi.clone(), lo.clone())
        }
    } else {
        let step_abs = i64::try_from(step_abs).unwrap_or(i64::MAX);
        let diff = binop("Sub", hi.clone(), lo.clone());
        let numer = binop("Add", diff, Expr::int(step_abs - 1));
        binop("Div", numer, Expr::int(step_abs))
    };

    int_typed(Expr::if_exp(test, Expr::int(0), positive))
}

fn is_simple_invariant(expr: &Expr, mutated: &BTreeSet<String>) -> bool {
    match &expr.kind {
        ExprKind::Constant { .. } => expr.const_int().is_some(),
        ExprKind::Name { id } => !id.is_empty() && !mutated.contains(id),
        _ => false,
    }
}

/// The single container appended to unconditionally at the top level of
/// `body`, if there is exactly one such append.
fn unconditional_append_owner(body: &[Stmt]) -> Option<String> {
    let mut owner: Option<String> = None;
    let mut appends = 0;
    for stmt in body {
        if stmt.is_control_flow() {
            return None;
        }
        let Stmt::Expr { value } = stmt else {
            continue;
        };
        let ExprKind::Call { func, .. } = &value.kind else {
            continue;
        };
        let ExprKind::Attribute { value: receiver, attr } = &func.kind else {
            continue;
        };
        if attr != "append" {
            continue;
        }
        let id = receiver.name_id()?;
        appends += 1;
        match &owner {
            None => owner = Some(id.to_string()),
            Some(existing) if existing != id => return None,
            Some(_) => {}
        }
    }
    if appends == 1 { owner } else { None }
}

fn hint_for(fc: &ForCore) -> Option<ReserveHint> {
    let IterPlan::StaticRangeForPlan { start, stop, step, range_mode } = &fc.iter_plan else {
        return None;
    };
    if fc.body.is_empty() || contains_opaque(&fc.body) {
        return None;
    }
    let step_value = step.const_int().filter(|v| *v != 0)?;
    // an empty mode is inferred from the step sign
    let consistent = match range_mode.trim() {
        "" => true,
        "ascending" => step_value > 0,
        "descending" => step_value < 0,
        _ => false,
    };
    if !consistent {
        return None;
    }

    let mut mutated = BTreeSet::new();
    collect_assigned_names(&fc.body, &mut mutated);
    if !is_simple_invariant(start, &mutated) || !is_simple_invariant(stop, &mutated) {
        return None;
    }

    let owner = unconditional_append_owner(&fc.body)?;
    let count_expr = static_range_trip_count(start, stop, step_value)?;
    Some(ReserveHint::static_range(owner, count_expr))
}

fn set_hints(fc: &mut ForCore, hints: Vec<ReserveHint>) -> usize {
    if fc.reserve_hints == hints {
        return 0;
    }
    fc.reserve_hints = hints;
    1
}

fn visit_block(stmts: &mut [Stmt]) -> usize {
    let mut count = 0;
    for stmt in stmts.iter_mut() {
        if let Stmt::ForCore(fc) = stmt {
            let hints = hint_for(fc).into_iter().collect();
            count += set_hints(fc, hints);
        }
        for block in stmt.blocks_mut() {
            count += visit_block(block);
        }
    }
    count
}

/// Marks static-range loops whose body appends to one list exactly once
/// per iteration with a `StaticRangeReserveHint`, and clears stale hints
/// from loops that no longer qualify.
pub struct SafeReserveHintPass;

impl East3OptimizerPass for SafeReserveHintPass {
    fn name(&self) -> &'static str {
        "SafeReserveHintPass"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_step_from_zero_counts_to_stop() {
        let count = static_range_trip_count(&Expr::int(0), &Expr::name("n"), 1).unwrap();
        let ExprKind::IfExp { orelse, .. } = &count.kind else {
            panic!("expected IfExp");
        };
        assert_eq!(orelse.name_id(), Some("n"));
    }

    #[test]
    fn zero_step_has_no_count() {
        assert!(static_range_trip_count(&Expr::int(0), &Expr::int(4), 0).is_none());
    }
}

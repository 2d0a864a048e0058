//! file: core/src/opt/passes/hoist_lite.rs
//! description: moves an invariant leading assignment out of a static loop.

use std::collections::BTreeSet;

use crate::error::East3ErrorExt;
use crate::ir::expr::Expr;
use crate::ir::stmt::{ForCore, Stmt, TargetPlan};
use crate::ir::walk::{collect_assigned_names, contains_name_call, contains_opaque};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::passes::invariance::{DYNAMIC_NAME_CALLS, is_invariant, is_statically_non_empty};
use crate::opt::result::PassResult;

fn leading_assignment(stmt: &Stmt) -> Option<(&str, &Expr)> {
    match stmt {
        Stmt::Assign { target, value } | Stmt::AnnAssign { target, value: Some(value), .. } => {
            Some((target.name_id()?, value))
        }
        _ => None,
    }
}

/// Whether the first body statement of `fc` can run once before the loop
/// instead of on every iteration.
fn can_hoist(fc: &ForCore) -> bool {
    if !is_statically_non_empty(&fc.iter_plan) {
        return false;
    }
    let TargetPlan::NameTarget { id: loop_var, .. } = &fc.target_plan else {
        return false;
    };
    if loop_var.is_empty() {
        return false;
    }
    let Some((first, rest)) = fc.body.split_first() else {
        return false;
    };
    if contains_name_call(&fc.body, &DYNAMIC_NAME_CALLS) || contains_opaque(&fc.body) {
        return false;
    }
    let Some((target, value)) = leading_assignment(first) else {
        return false;
    };

    let mut mutated = BTreeSet::new();
    collect_assigned_names(rest, &mut mutated);
    if target == loop_var || mutated.contains(target) {
        return false;
    }
    // `x = x + 1` reads its own previous value
    mutated.insert(target.to_string());
    let loop_vars = BTreeSet::from([loop_var.clone()]);
    is_invariant(value, &loop_vars, &mutated)
}

fn hoist_block(stmts: &mut Vec<Stmt>) -> usize {
    let mut count = 0;
    for stmt in stmts.iter_mut() {
        for block in stmt.blocks_mut() {
            count += hoist_block(block);
        }
    }

    let mut index = 0;
    while index < stmts.len() {
        if let Stmt::ForCore(fc) = &mut stmts[index] {
            if can_hoist(fc) {
                let hoisted = fc.body.remove(0);
                stmts.insert(index, hoisted);
                count += 1;
                index += 2;
                continue;
            }
        }
        index += 1;
    }
    count
}

/// Hoists the first statement of a statically non-empty `range` loop when
/// it assigns a plain name an expression built only from numeric literals
/// and names the loop never rebinds. At most one statement per loop moves.
pub struct LoopInvariantHoistLitePass;

impl East3OptimizerPass for LoopInvariantHoistLitePass {
    fn name(&self) -> &'static str {
        "LoopInvariantHoistLitePass"
    }

    fn min_opt_level(&self) -> u8 {
        2
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        Ok(PassResult::from_count(hoist_block(&mut document.body)))
    }
}

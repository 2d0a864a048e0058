//! file: core/src/opt/passes/loop_var_elision.rs
//! description: renames static-range loop variables nobody reads to `_`.
//!
//! Mentions are tallied per scope: the module body, and each function body
//! on its own. A tally covers every nested block and nested function, so a
//! closure reading the variable keeps it alive. A loop target is elided
//! only when the target plan is its sole mention in the scope.

use std::collections::BTreeMap;

use crate::error::East3ErrorExt;
use crate::ir::expr::{Expr, ExprKind};
use crate::ir::stmt::{IterPlan, Stmt, TargetPlan};
use crate::ir::walk::{contains_name_call, contains_opaque, visit_expr};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::passes::invariance::DYNAMIC_NAME_CALLS;
use crate::opt::result::PassResult;

pub const ELIDED_LOOP_VAR: &str = "_";

type Tally = BTreeMap<String, usize>;

fn bump(tally: &mut Tally, name: &str) {
    if !name.is_empty() {
        *tally.entry(name.to_string()).or_default() += 1;
    }
}

fn tally_expr(expr: &Expr, tally: &mut Tally) {
    visit_expr(expr, &mut |e| match &e.kind {
        ExprKind::Name { id } => bump(tally, id),
        ExprKind::Lambda { arg_order, .. } => arg_order.iter().for_each(|a| bump(tally, a)),
        ExprKind::Opaque(node) => {
            let mut names = Default::default();
            node.bound_names(&mut names);
            names.iter().for_each(|n: &String| bump(tally, n));
        }
        _ => {}
    });
}

fn tally_stmts(stmts: &[Stmt], tally: &mut Tally) {
    for stmt in stmts {
        for expr in stmt.exprs() {
            tally_expr(expr, tally);
        }
        match stmt {
            Stmt::ForCore(fc) => {
                let mut names = Vec::new();
                fc.target_plan.names(&mut names);
                names.iter().for_each(|n| bump(tally, n));
            }
            Stmt::FunctionDef(def) => {
                bump(tally, &def.name);
                def.arg_order.iter().for_each(|a| bump(tally, a));
            }
            Stmt::ClassDef(class) => bump(tally, &class.name),
            Stmt::Try { handlers, .. } => {
                handlers.iter().filter_map(|h| h.name.as_deref()).for_each(|n| bump(tally, n));
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    bump(tally, bound.split('.').next().unwrap_or_default());
                }
            }
            Stmt::Global { names } | Stmt::Nonlocal { names } => {
                names.iter().for_each(|n| bump(tally, n));
            }
            Stmt::Opaque(node) => {
                let mut names = Default::default();
                node.bound_names(&mut names);
                names.iter().for_each(|n: &String| bump(tally, n));
            }
            _ => {}
        }
        for block in stmt.blocks() {
            tally_stmts(block, tally);
        }
    }
}

/// Renames eligible loop targets in `stmts`, without entering function or
/// class bodies. Those are reported through `nested` instead.
fn elide_block<'a>(stmts: &'a mut [Stmt], tally: Option<&Tally>, nested: &mut Vec<&'a mut Vec<Stmt>>) -> usize {
    let mut count = 0;
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::FunctionDef(def) => {
                nested.push(&mut def.body);
                continue;
            }
            Stmt::ClassDef(class) => {
                // class-level loop targets become attributes; only methods
                // get a scope of their own
                count += elide_block(&mut class.body, None, nested);
                continue;
            }
            Stmt::ForCore(fc) => {
                if let (Some(tally), IterPlan::StaticRangeForPlan { .. }) = (tally, &fc.iter_plan) {
                    if let TargetPlan::NameTarget { id, .. } = &mut fc.target_plan {
                        if id != ELIDED_LOOP_VAR && tally.get(id.as_str()) == Some(&1) {
                            *id = ELIDED_LOOP_VAR.to_string();
                            count += 1;
                        }
                    }
                }
            }
            _ => {}
        }
        for block in stmt.blocks_mut() {
            count += elide_block(block, tally, nested);
        }
    }
    count
}

fn elide_scope(scope: &mut Vec<Stmt>) -> usize {
    let tally = if contains_name_call(scope, &DYNAMIC_NAME_CALLS) || contains_opaque(scope) {
        None
    } else {
        let mut tally = Tally::new();
        tally_stmts(scope, &mut tally);
        Some(tally)
    };
    let mut nested = Vec::new();
    let mut count = elide_block(scope, tally.as_ref(), &mut nested);
    for body in nested {
        count += elide_scope(body);
    }
    count
}

/// Drops the binding of static-range loop variables that are never read,
/// so targets can emit a plain counted loop.
pub struct UnusedLoopVarElisionPass;

impl East3OptimizerPass for UnusedLoopVarElisionPass {
    fn name(&self) -> &'static str {
        "UnusedLoopVarElisionPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        Ok(PassResult::from_count(elide_scope(&mut document.body)))
    }
}

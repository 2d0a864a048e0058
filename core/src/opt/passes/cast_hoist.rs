//! file: core/src/opt/passes/cast_hoist.rs
//! description: hoists loop-invariant numeric casts out of static loops.
//!
//! A cast is hoisted when it is a builtin-lowered `static_cast` to a
//! numeric type whose only argument is built from literals and names the
//! loop never rebinds, in any scope nested inside it. Each distinct cast
//! becomes one `AnnAssign` of a `__hoisted_cast_N` temporary placed right
//! before the loop. Nested function, class and lambda bodies are never
//! rewritten, and loops holding opaque nodes are skipped.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::East3ErrorExt;
use crate::ir::expr::{Expr, ExprKind, canonical_numeric_type, is_int_like_type, normalize_type_name};
use crate::ir::stmt::{IterPlan, Stmt};
use crate::ir::walk::{collect_assigned_names, collect_name_ids, contains_name_call, contains_opaque};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::passes::invariance::{DYNAMIC_NAME_CALLS, is_invariant, loop_vars};
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

pub const HOISTED_CAST_PREFIX: &str = "__hoisted_cast_";

fn temp_name_expr(name: &str, value_type: &str) -> Expr {
    Expr::name(name).with_type(value_type).with_borrow("readonly_ref")
}

fn hoisted_decl(name: &str, value: Expr, value_type: &str) -> Stmt {
    Stmt::AnnAssign {
        target: Expr::name(name).with_type(value_type).with_borrow("value"),
        annotation: value_type.to_string(),
        value: Some(value),
        declare: true,
        declare_init: Some(true),
        decl_type: Some(value_type.to_string()),
    }
}

fn static_cast_call(value: Expr, target_type: &str) -> Expr {
    let builtin = if target_type.starts_with("int") || target_type.starts_with("uint") {
        "int"
    } else {
        "float"
    };
    Expr::builtin_call(builtin, "static_cast", vec![value])
        .with_type(target_type)
        .with_borrow("value")
}

/// Rewrites one loop body, collecting the declarations to hoist.
struct Hoister<'a> {
    loop_vars: BTreeSet<String>,
    mutated: BTreeSet<String>,
    used_names: BTreeSet<String>,
    next_seq: &'a mut usize,
    temps: BTreeMap<String, String>,
    hoisted: Vec<Stmt>,
}

impl Hoister<'_> {
    fn fresh_name(&mut self) -> String {
        loop {
            *self.next_seq += 1;
            let name = format!("{}{}", HOISTED_CAST_PREFIX, self.next_seq);
            if self.used_names.insert(name.clone()) {
                return name;
            }
        }
    }

    /// Temporary holding `value` under `key`, declaring it on first use.
    fn temp_for(&mut self, key: String, value: impl FnOnce() -> Expr, value_type: &str) -> String {
        if let Some(existing) = self.temps.get(&key) {
            return existing.clone();
        }
        let name = self.fresh_name();
        self.hoisted.push(hoisted_decl(&name, value(), value_type));
        self.temps.insert(key, name.clone());
        name
    }

    fn invariant(&self, expr: &Expr) -> bool {
        is_invariant(expr, &self.loop_vars, &self.mutated)
    }

    fn is_candidate(&self, expr: &Expr) -> bool {
        if !expr.is_builtin_runtime_call("static_cast") {
            return false;
        }
        if canonical_numeric_type(expr.resolved_type.as_deref()).is_none() {
            return false;
        }
        match &expr.kind {
            ExprKind::Call { args, .. } => args.len() == 1 && self.invariant(&args[0]),
            _ => false,
        }
    }

    /// Replaces the right operand of a binary node with a hoisted cast
    /// when an int-to-numeric promotion is applied to an invariant value.
    fn hoist_binop_right_cast(&mut self, expr: &mut Expr) -> usize {
        let ExprKind::BinOp { right, .. } = &expr.kind else {
            return 0;
        };
        if expr.casts.is_empty() || !self.invariant(right) {
            return 0;
        }
        let original_right = right.as_ref().clone();
        let right_key = original_right.canonical_key();

        let mut kept = Vec::with_capacity(expr.casts.len());
        let mut replacement = None;
        let mut changes = 0;
        for rule in std::mem::take(&mut expr.casts) {
            let target = canonical_numeric_type(Some(&rule.to));
            let applies = normalize_type_name(Some(&rule.on)) == "right"
                && is_int_like_type(Some(&rule.from));
            let Some(target) = target.filter(|_| applies) else {
                kept.push(rule);
                continue;
            };
            let key = format!("__binop_right_cast__:{}:{}", target, right_key);
            let name = self.temp_for(key, || static_cast_call(original_right.clone(), &target), &target);
            replacement = Some(temp_name_expr(&name, &target));
            changes += 1;
        }
        expr.casts = kept;
        if let (Some(new_right), ExprKind::BinOp { right, .. }) = (replacement, &mut expr.kind) {
            **right = new_right;
        }
        changes
    }

    fn rewrite_expr(&mut self, expr: &mut Expr) -> usize {
        // a lambda body runs in its own scope, possibly after the loop
        if matches!(expr.kind, ExprKind::Lambda { .. }) {
            return 0;
        }
        let mut changes = 0;
        for child in expr.children_mut() {
            changes += self.rewrite_expr(child);
        }
        changes += self.hoist_binop_right_cast(expr);

        if !self.is_candidate(expr) {
            return changes;
        }
        let Some(value_type) = canonical_numeric_type(expr.resolved_type.as_deref()) else {
            return changes;
        };
        let key = expr.canonical_key();
        let name = self.temp_for(key, || expr.clone(), &value_type);
        *expr = temp_name_expr(&name, &value_type);
        changes + 1
    }

    fn rewrite_block(&mut self, stmts: &mut [Stmt]) -> usize {
        let mut changes = 0;
        for stmt in stmts.iter_mut() {
            if matches!(stmt, Stmt::FunctionDef(_) | Stmt::ClassDef(_)) {
                continue;
            }
            for expr in stmt.exprs_mut() {
                changes += self.rewrite_expr(expr);
            }
            for block in stmt.blocks_mut() {
                changes += self.rewrite_block(block);
            }
        }
        changes
    }
}

/// Tries to hoist casts out of the loop at `stmts[index]`. Returns the
/// number of rewrites and the number of statements inserted before it.
fn try_hoist(stmts: &mut Vec<Stmt>, index: usize, next_seq: &mut usize) -> (usize, usize) {
    let Stmt::ForCore(fc) = &stmts[index] else {
        return (0, 0);
    };
    if !matches!(fc.iter_plan, IterPlan::StaticRangeForPlan { .. }) || fc.body.is_empty() {
        return (0, 0);
    }
    if contains_name_call(&fc.body, &DYNAMIC_NAME_CALLS) || contains_opaque(&fc.body) {
        return (0, 0);
    }

    let loop_vars = loop_vars(fc);
    if loop_vars.is_empty() {
        return (0, 0);
    }
    let mut mutated = BTreeSet::new();
    collect_assigned_names(&fc.body, &mut mutated);
    mutated.retain(|name| !loop_vars.contains(name));
    let mut used_names = BTreeSet::new();
    collect_name_ids(stmts, &mut used_names);

    let mut hoister = Hoister {
        loop_vars,
        mutated,
        used_names,
        next_seq,
        temps: BTreeMap::new(),
        hoisted: Vec::new(),
    };
    let Stmt::ForCore(fc) = &mut stmts[index] else {
        return (0, 0);
    };
    let changes = hoister.rewrite_block(&mut fc.body);
    if changes == 0 || hoister.hoisted.is_empty() {
        return (0, 0);
    }
    let inserted = hoister.hoisted.len();
    stmts.splice(index..index, hoister.hoisted);
    (changes, inserted)
}

fn visit_block(stmts: &mut Vec<Stmt>, next_seq: &mut usize) -> usize {
    let mut changes = 0;
    let mut i = 0;
    while i < stmts.len() {
        let (delta, inserted) = try_hoist(stmts, i, next_seq);
        changes += delta;
        i += inserted + 1;
    }
    for stmt in stmts.iter_mut() {
        for block in stmt.blocks_mut() {
            changes += visit_block(block, next_seq);
        }
    }
    changes
}

/// Hoists invariant `static_cast` calls used inside static `ForCore`
/// loops into preheader declarations.
pub struct LoopInvariantCastHoistPass;

impl East3OptimizerPass for LoopInvariantCastHoistPass {
    fn name(&self) -> &'static str {
        "LoopInvariantCastHoistPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        _context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        let mut next_seq = 0;
        Ok(PassResult::from_count(visit_block(&mut document.body, &mut next_seq)))
    }
}

//! file: core/src/ir/walk.rs
//! description: read-only and mutable traversal helpers over EAST3 trees.
//!
//! Both flavours visit nodes in the same pre-order: a statement's own
//! expressions first, then its nested blocks.

use std::collections::BTreeSet;

use crate::ir::expr::{Comprehension, Expr, ExprKind};
use crate::ir::stmt::Stmt;

/// Calls `f` on `expr` and every sub-expression, parents first.
pub fn visit_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    for child in expr.children() {
        visit_expr(child, f);
    }
}

/// Calls `f` on every expression reachable from `stmts`, nested function
/// and class bodies included.
pub fn visit_stmts_exprs<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Expr)) {
    for stmt in stmts {
        for expr in stmt.exprs() {
            visit_expr(expr, f);
        }
        for block in stmt.blocks() {
            visit_stmts_exprs(block, f);
        }
    }
}

/// Hands every top-level statement expression of `stmts` to `f`, nested
/// blocks included, and sums what `f` reports. `f` owns the recursion into
/// sub-expressions.
pub fn rewrite_stmts_exprs(stmts: &mut [Stmt], f: &mut impl FnMut(&mut Expr) -> usize) -> usize {
    let mut count = 0;
    for stmt in stmts.iter_mut() {
        for expr in stmt.exprs_mut() {
            count += f(expr);
        }
        for block in stmt.blocks_mut() {
            count += rewrite_stmts_exprs(block, f);
        }
    }
    count
}

fn note_name(expr: &Expr, out: &mut BTreeSet<String>) {
    match &expr.kind {
        ExprKind::Opaque(node) => node.name_ids(out),
        _ => {
            if let Some(id) = expr.name_id() {
                out.insert(id.to_string());
            }
        }
    }
}

/// Names referenced anywhere in `expr`, including inside opaque nodes.
pub fn collect_expr_names(expr: &Expr, out: &mut BTreeSet<String>) {
    visit_expr(expr, &mut |e| note_name(e, out));
}

/// Every identifier mentioned in `stmts`: name references, loop target
/// plans, function parameters and anything named inside opaque nodes.
pub fn collect_name_ids(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    visit_stmts_exprs(stmts, &mut |e| note_name(e, out));
    for stmt in stmts {
        match stmt {
            Stmt::ForCore(fc) => {
                let mut names = Vec::new();
                fc.target_plan.names(&mut names);
                out.extend(names);
            }
            Stmt::FunctionDef(def) => out.extend(def.arg_order.iter().cloned()),
            Stmt::Opaque(node) => node.name_ids(out),
            _ => {}
        }
        for block in stmt.blocks() {
            collect_name_ids(block, out);
        }
    }
}

/// Whether `stmts` contain a statement or expression of a kind the typed
/// model does not cover, at any depth.
pub fn contains_opaque(stmts: &[Stmt]) -> bool {
    fn opaque_stmt(stmts: &[Stmt]) -> bool {
        stmts.iter().any(|stmt| {
            matches!(stmt, Stmt::Opaque(_)) || stmt.blocks().into_iter().any(|block| opaque_stmt(block))
        })
    }

    let mut found = false;
    visit_stmts_exprs(stmts, &mut |e| found |= matches!(e.kind, ExprKind::Opaque(_)));
    found || opaque_stmt(stmts)
}

fn collect_target_names(target: &Expr, out: &mut BTreeSet<String>) {
    match &target.kind {
        ExprKind::Name { id } if !id.is_empty() => {
            out.insert(id.clone());
        }
        ExprKind::Tuple { elements } | ExprKind::List { elements } => {
            for element in elements {
                collect_target_names(element, out);
            }
        }
        ExprKind::Starred { value } => collect_target_names(value, out),
        _ => {}
    }
}

/// Names bound by expression-level scopes inside `expr`: comprehension
/// targets, lambda parameters and anything an opaque node might bind.
fn collect_expr_bindings(expr: &Expr, out: &mut BTreeSet<String>) {
    visit_expr(expr, &mut |e| match &e.kind {
        ExprKind::Lambda { arg_order, .. } => {
            out.extend(arg_order.iter().filter(|a| !a.is_empty()).cloned());
        }
        ExprKind::Opaque(node) => node.bound_names(out),
        kind => {
            for generator in Comprehension::of(kind) {
                out.extend(generator.target_names().into_iter().map(str::to_string));
            }
        }
    });
}

/// Names (re)bound anywhere inside `stmts`, nested scopes included:
/// assignment and loop targets, `ForCore` target plans, comprehension
/// targets, lambda and nested function parameters, definition names,
/// `except ... as` and `with ... as` names, import aliases, and every name
/// an opaque node mentions.
pub fn collect_assigned_names(stmts: &[Stmt], out: &mut BTreeSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. }
            | Stmt::AnnAssign { target, .. }
            | Stmt::AugAssign { target, .. }
            | Stmt::For { target, .. }
            | Stmt::ForRange { target, .. } => collect_target_names(target, out),
            Stmt::Swap { left, right } => {
                collect_target_names(left, out);
                collect_target_names(right, out);
            }
            Stmt::ForCore(fc) => {
                let mut names = Vec::new();
                fc.target_plan.names(&mut names);
                out.extend(names);
            }
            Stmt::FunctionDef(def) => {
                out.insert(def.name.clone());
                out.extend(def.arg_order.iter().filter(|a| !a.is_empty()).cloned());
            }
            Stmt::ClassDef(class) => {
                out.insert(class.name.clone());
            }
            Stmt::Try { handlers, .. } => {
                out.extend(handlers.iter().filter_map(|h| h.name.clone()));
            }
            Stmt::With { items, .. } => {
                for vars in items.iter().filter_map(|item| item.optional_vars.as_ref()) {
                    collect_target_names(vars, out);
                }
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    let head = bound.split('.').next().unwrap_or_default();
                    if !head.is_empty() && head != "*" {
                        out.insert(head.to_string());
                    }
                }
            }
            Stmt::Opaque(node) => node.bound_names(out),
            _ => {}
        }
        for expr in stmt.exprs() {
            collect_expr_bindings(expr, out);
        }
        for block in stmt.blocks() {
            collect_assigned_names(block, out);
        }
    }
}

/// Whether `stmts` call any of `names` by bare name anywhere.
pub fn contains_name_call(stmts: &[Stmt], names: &[&str]) -> bool {
    let mut found = false;
    visit_stmts_exprs(stmts, &mut |e| {
        if let ExprKind::Call { func, .. } = &e.kind {
            if func.name_id().is_some_and(|id| names.contains(&id)) {
                found = true;
            }
        }
    });
    found
}

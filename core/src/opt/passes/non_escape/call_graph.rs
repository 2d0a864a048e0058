//! file: core/src/opt/passes/non_escape/call_graph.rs
//! description: whole-program symbol index and call-site resolution.
//!
//! Every top-level function `f` of module `m` is the symbol `m::f`; every
//! method `g` of a top-level class `C` is `m::C.g`. Calls are resolved
//! through the caller's own definitions first and its import bindings
//! second, following re-export chains across loaded modules.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::expr::{Expr, ExprKind};
use crate::ir::module::{BindingKind, Module};
use crate::ir::stmt::{FunctionDef, Stmt};
use crate::ir::symbol::Symbol;
use crate::ir::walk::{collect_expr_names, visit_expr};

/// Builtins known not to retain or return their arguments.
pub const PURE_BUILTINS: [&str; 5] = ["len", "str", "bool", "int", "float"];

/// Functions and methods defined at the top level of `body`, keyed by
/// local name. A later definition shadows an earlier one.
pub fn module_functions(body: &[Stmt]) -> BTreeMap<String, &FunctionDef> {
    let mut out = BTreeMap::new();
    for stmt in body {
        match stmt {
            Stmt::FunctionDef(def) if !def.name.trim().is_empty() => {
                out.insert(def.name.trim().to_string(), def);
            }
            Stmt::ClassDef(class) if !class.name.trim().is_empty() => {
                for child in &class.body {
                    if let Stmt::FunctionDef(def) = child {
                        if !def.name.trim().is_empty() {
                            out.insert(format!("{}.{}", class.name.trim(), def.name.trim()), def);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Mutable counterpart of [`module_functions`].
pub fn module_functions_mut(body: &mut [Stmt]) -> BTreeMap<String, &mut FunctionDef> {
    let mut out = BTreeMap::new();
    for stmt in body.iter_mut() {
        match stmt {
            Stmt::FunctionDef(def) if !def.name.trim().is_empty() => {
                out.insert(def.name.trim().to_string(), def);
            }
            Stmt::ClassDef(class) if !class.name.trim().is_empty() => {
                let class_name = class.name.trim().to_string();
                for child in class.body.iter_mut() {
                    if let Stmt::FunctionDef(def) = child {
                        if !def.name.trim().is_empty() {
                            out.insert(format!("{}.{}", class_name, def.name.trim()), def);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Non-empty parameter names of `def`, in declaration order.
pub fn arg_order(def: &FunctionDef) -> Vec<String> {
    def.arg_order
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parameter name to positional index.
pub fn arg_index(arg_order: &[String]) -> BTreeMap<&str, usize> {
    arg_order.iter().enumerate().map(|(i, name)| (name.as_str(), i)).collect()
}

/// Name tables of one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleSymbols {
    /// Local name (`f` or `C.m`) to qualified symbol.
    pub local: BTreeMap<String, Symbol>,
    /// Alias to imported module id.
    pub import_modules: BTreeMap<String, String>,
    /// Alias to imported symbol.
    pub import_symbols: BTreeMap<String, Symbol>,
}

impl ModuleSymbols {
    pub fn collect(module_id: &str, doc: &Module) -> Self {
        let local = module_functions(&doc.body)
            .into_keys()
            .map(|name| (name.clone(), Symbol::new(module_id, name)))
            .collect();

        let mut import_modules = BTreeMap::new();
        let mut import_symbols = BTreeMap::new();
        for binding in &doc.meta.import_bindings {
            let target = binding.module_id.trim();
            let alias = binding.local_name.trim();
            if target.is_empty() || alias.is_empty() {
                continue;
            }
            match binding.binding_kind {
                BindingKind::Module => {
                    import_modules.insert(alias.to_string(), target.to_string());
                }
                BindingKind::Symbol => {
                    let export = binding.export_name.trim();
                    if !export.is_empty() {
                        import_symbols.insert(alias.to_string(), Symbol::new(target, export));
                    }
                }
            }
        }

        Self { local, import_modules, import_symbols }
    }
}

/// One call expression inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Best candidate callee, kept even when it is not part of the program.
    pub target: Option<Symbol>,
    pub resolved: bool,
    pub in_return_expr: bool,
    /// Per positional argument, the sorted caller parameter indices it mentions.
    pub arg_sources: Vec<Vec<usize>>,
    /// Unresolved call to one of [`PURE_BUILTINS`].
    pub pure_builtin: bool,
    /// Stands for an opaque node rather than a call. Such a site is never
    /// resolved and has no call node to annotate.
    pub opaque: bool,
}

/// Calls `f` on every opaque statement or expression in `stmts` with the
/// names it mentions and whether it is the direct value of a `return`.
fn visit_opaque(stmts: &[Stmt], f: &mut impl FnMut(BTreeSet<String>, bool)) {
    for stmt in stmts {
        if let Stmt::Opaque(node) = stmt {
            let mut names = BTreeSet::new();
            node.name_ids(&mut names);
            f(names, false);
        }
        let is_return = matches!(stmt, Stmt::Return { .. });
        for expr in stmt.exprs() {
            visit_expr(expr, &mut |e| {
                if let ExprKind::Opaque(node) = &e.kind {
                    let mut names = BTreeSet::new();
                    node.name_ids(&mut names);
                    f(names, is_return && std::ptr::eq(e, expr));
                }
            });
        }
        for block in stmt.blocks() {
            visit_opaque(block, f);
        }
    }
}

/// Calls `f` on every call node in `stmts` in pre-order, together with
/// whether the call is the direct value of a `return`.
pub fn visit_calls<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a Expr, bool)) {
    fn visit_expr<'a>(expr: &'a Expr, in_return: bool, f: &mut impl FnMut(&'a Expr, bool)) {
        if matches!(expr.kind, ExprKind::Call { .. }) {
            f(expr, in_return);
        }
        for child in expr.children() {
            visit_expr(child, false, f);
        }
    }

    for stmt in stmts {
        let is_return = matches!(stmt, Stmt::Return { .. });
        for expr in stmt.exprs() {
            visit_expr(expr, is_return, f);
        }
        for block in stmt.blocks() {
            visit_calls(block, f);
        }
    }
}

/// Mutable counterpart of [`visit_calls`], same order.
pub fn visit_calls_mut(stmts: &mut [Stmt], f: &mut impl FnMut(&mut Expr, bool)) {
    fn visit_expr(expr: &mut Expr, in_return: bool, f: &mut impl FnMut(&mut Expr, bool)) {
        if matches!(expr.kind, ExprKind::Call { .. }) {
            f(expr, in_return);
        }
        for child in expr.children_mut() {
            visit_expr(child, false, f);
        }
    }

    for stmt in stmts.iter_mut() {
        let is_return = matches!(stmt, Stmt::Return { .. });
        for expr in stmt.exprs_mut() {
            visit_expr(expr, is_return, f);
        }
        for block in stmt.blocks_mut() {
            visit_calls_mut(block, f);
        }
    }
}

/// Symbol tables for every module of a program closure.
pub struct ProgramIndex<'a> {
    pub modules: BTreeMap<String, ModuleSymbols>,
    pub functions: BTreeMap<Symbol, &'a FunctionDef>,
}

impl<'a> ProgramIndex<'a> {
    /// Indexes `(module_id, document)` pairs. The id given here wins over
    /// whatever the document itself declares.
    pub fn new(docs: impl IntoIterator<Item = (&'a str, &'a Module)>) -> Self {
        let mut modules = BTreeMap::new();
        let mut functions = BTreeMap::new();
        for (module_id, doc) in docs {
            for (name, def) in module_functions(&doc.body) {
                functions.insert(Symbol::new(module_id, name), def);
            }
            modules.insert(module_id.to_string(), ModuleSymbols::collect(module_id, doc));
        }
        Self { modules, functions }
    }

    pub fn is_known(&self, symbol: &Symbol) -> bool {
        self.functions.contains_key(symbol)
    }

    /// Follows `from x import f` re-exports until a defined symbol is
    /// reached. Returns `candidate` unchanged when the chain dead-ends or loops.
    fn follow_reexports(&self, candidate: Symbol) -> Symbol {
        let mut seen = BTreeSet::new();
        let mut current = candidate.clone();
        while !self.is_known(&current) {
            if !seen.insert(current.clone()) {
                return candidate;
            }
            let next = self
                .modules
                .get(&current.module_id)
                .and_then(|m| m.import_symbols.get(&current.local_name));
            match next {
                Some(next) => current = next.clone(),
                None => return candidate,
            }
        }
        current
    }

    /// Best callee candidate for a call made from `caller` through `func`.
    pub fn resolve_callee(&self, caller: &Symbol, func: &Expr) -> Option<Symbol> {
        let scope = self.modules.get(&caller.module_id)?;
        match &func.kind {
            ExprKind::Name { id } => {
                let id = id.trim();
                if let Some(local) = scope.local.get(id) {
                    return Some(local.clone());
                }
                let imported = scope.import_symbols.get(id)?;
                Some(self.follow_reexports(imported.clone()))
            }
            ExprKind::Attribute { value, attr } => {
                let owner = value.name_id()?.trim();
                let attr = attr.trim();
                if owner == "self" {
                    if let Some(class) = caller.owner_class() {
                        if let Some(method) = scope.local.get(&format!("{}.{}", class, attr)) {
                            return Some(method.clone());
                        }
                    }
                }
                if let Some(local) = scope.local.get(&format!("{}.{}", owner, attr)) {
                    return Some(local.clone());
                }
                let module_id = scope.import_modules.get(owner)?;
                Some(self.follow_reexports(Symbol::new(module_id.clone(), attr)))
            }
            _ => None,
        }
    }

    /// Call sites of `caller`: real calls in pre-order, then one site per
    /// opaque node.
    pub fn call_sites(&self, caller: &Symbol, def: &FunctionDef) -> Vec<CallSite> {
        let params = arg_order(def);
        let index = arg_index(&params);
        let mut sites = Vec::new();
        visit_calls(&def.body, &mut |call, in_return_expr| {
            let ExprKind::Call { func, args, builtin_name, .. } = &call.kind else {
                return;
            };
            let target = self.resolve_callee(caller, func);
            let resolved = target.as_ref().is_some_and(|t| self.is_known(t));

            let arg_sources = args
                .iter()
                .map(|arg| {
                    let mut names = BTreeSet::new();
                    collect_expr_names(arg, &mut names);
                    let refs: BTreeSet<usize> =
                        names.iter().filter_map(|n| index.get(n.as_str()).copied()).collect();
                    refs.into_iter().collect()
                })
                .collect();

            let callee_name = builtin_name.as_deref().or_else(|| func.name_id());
            let pure_builtin = !resolved && callee_name.is_some_and(|n| PURE_BUILTINS.contains(&n));

            sites.push(CallSite {
                target,
                resolved,
                in_return_expr,
                arg_sources,
                pure_builtin,
                opaque: false,
            });
        });
        // unknown node kinds may call anything with any of the names they mention
        visit_opaque(&def.body, &mut |names, in_return_expr| {
            let sources: BTreeSet<usize> =
                names.iter().filter_map(|n| index.get(n.as_str()).copied()).collect();
            sites.push(CallSite {
                target: None,
                resolved: false,
                in_return_expr,
                arg_sources: vec![sources.into_iter().collect()],
                pure_builtin: false,
                opaque: true,
            });
        });
        sites
    }
}

/// Caller-to-callee edges plus per-caller call sites and unresolved counts.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub edges: BTreeMap<Symbol, BTreeSet<Symbol>>,
    pub unresolved: BTreeMap<Symbol, usize>,
    pub sites: BTreeMap<Symbol, Vec<CallSite>>,
}

impl CallGraph {
    pub fn build(index: &ProgramIndex<'_>) -> Self {
        let mut graph = CallGraph::default();
        for (caller, def) in &index.functions {
            let sites = index.call_sites(caller, def);
            let mut edges = BTreeSet::new();
            let mut unresolved = 0;
            for site in &sites {
                match &site.target {
                    Some(target) if site.resolved => {
                        edges.insert(target.clone());
                    }
                    _ => unresolved += 1,
                }
            }
            graph.edges.insert(caller.clone(), edges);
            graph.unresolved.insert(caller.clone(), unresolved);
            graph.sites.insert(caller.clone(), sites);
        }
        graph
    }
}

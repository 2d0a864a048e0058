//! Escape summaries: direct seeds plus a monotone fixed point over the
//! call graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::annotation::EscapeSummary;
use crate::ir::stmt::{FunctionDef, Stmt};
use crate::ir::symbol::Symbol;
use crate::ir::walk::collect_expr_names;
use crate::opt::context::NonEscapePolicy;
use crate::opt::passes::non_escape::call_graph::{CallGraph, CallSite, ProgramIndex, arg_index, arg_order};

/// Parameters referenced by value-returning `return`s anywhere in `stmts`.
/// Returns whether any such `return` exists.
fn collect_return_refs(stmts: &[Stmt], index: &BTreeMap<&str, usize>, out: &mut BTreeSet<usize>) -> bool {
    let mut has_value = false;
    for stmt in stmts {
        if let Stmt::Return { value: Some(value) } = stmt {
            has_value = true;
            let mut names = BTreeSet::new();
            collect_expr_names(value, &mut names);
            out.extend(names.iter().filter_map(|n| index.get(n.as_str()).copied()));
        }
        for block in stmt.blocks() {
            has_value |= collect_return_refs(block, index, out);
        }
    }
    has_value
}

/// Summary from direct evidence only.
pub fn seed_summary(
    symbol: &Symbol,
    def: &FunctionDef,
    sites: &[CallSite],
    unresolved_calls: usize,
    policy: &NonEscapePolicy,
) -> EscapeSummary {
    let params = arg_order(def);
    let index = arg_index(&params);

    let mut returned = BTreeSet::new();
    let has_return_value = collect_return_refs(&def.body, &index, &mut returned);
    let return_from_args: Vec<bool> = (0..params.len()).map(|i| returned.contains(&i)).collect();

    let mut arg_escape = vec![false; params.len()];
    if policy.unknown_call_escape {
        for site in sites.iter().filter(|s| !s.resolved) {
            for &k in site.arg_sources.iter().flatten() {
                if let Some(slot) = arg_escape.get_mut(k) {
                    *slot = true;
                }
            }
        }
    }

    let return_escape = has_return_value
        || return_from_args.iter().any(|b| *b)
        || (policy.unknown_call_escape && unresolved_calls > 0);

    EscapeSummary {
        symbol: symbol.clone(),
        arg_order: params,
        arg_escape,
        return_escape,
        return_from_args,
        unresolved_calls,
    }
}

/// Sets `flags[k]` for every `k` in `sources`; reports whether any flipped.
fn raise_all(flags: &mut [bool], sources: &[usize]) -> bool {
    let mut flipped = false;
    for &k in sources {
        if let Some(slot) = flags.get_mut(k) {
            if !*slot {
                *slot = true;
                flipped = true;
            }
        }
    }
    flipped
}

/// One propagation step for `caller` against the current summaries.
fn propagate(
    current: &EscapeSummary,
    sites: &[CallSite],
    summaries: &BTreeMap<Symbol, EscapeSummary>,
) -> Option<EscapeSummary> {
    let mut next = current.clone();
    let mut changed = false;
    for site in sites.iter().filter(|s| s.resolved) {
        let Some(callee) = site.target.as_ref().and_then(|t| summaries.get(t)) else {
            continue;
        };
        for (j, sources) in site.arg_sources.iter().enumerate() {
            if callee.arg_escape.get(j).copied().unwrap_or(false) {
                changed |= raise_all(&mut next.arg_escape, sources);
            }
        }
        if site.in_return_expr {
            if callee.return_escape && !next.return_escape {
                next.return_escape = true;
                changed = true;
            }
            for (j, sources) in site.arg_sources.iter().enumerate() {
                if callee.return_from_args.get(j).copied().unwrap_or(false) {
                    changed |= raise_all(&mut next.return_from_args, sources);
                }
            }
        }
    }
    if next.return_from_args.iter().any(|b| *b) && !next.return_escape {
        next.return_escape = true;
        changed = true;
    }
    changed.then_some(next)
}

/// Solves summaries for every function of the program. Symbols are visited
/// in sorted order until a full sweep flips nothing.
pub fn solve_summaries(
    index: &ProgramIndex<'_>,
    graph: &CallGraph,
    policy: &NonEscapePolicy,
) -> BTreeMap<Symbol, EscapeSummary> {
    let no_sites = Vec::new();
    let mut summaries: BTreeMap<Symbol, EscapeSummary> = index
        .functions
        .iter()
        .map(|(symbol, def)| {
            let sites = graph.sites.get(symbol).unwrap_or(&no_sites);
            let unresolved = graph.unresolved.get(symbol).copied().unwrap_or(0);
            (symbol.clone(), seed_summary(symbol, def, sites, unresolved, policy))
        })
        .collect();

    let symbols: Vec<Symbol> = summaries.keys().cloned().collect();
    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let mut changed = false;
        for symbol in &symbols {
            let sites = graph.sites.get(symbol).unwrap_or(&no_sites);
            if let Some(next) = propagate(&summaries[symbol], sites, &summaries) {
                summaries.insert(symbol.clone(), next);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    log::debug!("non_escape: {} summaries converged after {} sweeps", summaries.len(), sweeps);
    summaries
}

//! file: core/src/opt/passes/non_escape/mod.rs
//! description: interprocedural escape summaries for every function in the
//! program closure of a module.
//!
//! The pass loads the modules the root imports, builds a call graph over all
//! of them, solves per-function [`EscapeSummary`]s and writes the results
//! back into the root: the whole summary map under
//! `meta.non_escape_summary`, one `escape_summary` per root function and one
//! `non_escape_callsite` per call inside a root function.

pub mod call_graph;
pub mod closure;
pub mod scc;
pub mod stub;
pub mod summary;

use std::collections::BTreeMap;

use log::{Level, debug, log};

use crate::error::East3ErrorExt;
use crate::ir::annotation::{CallsiteAnnotation, EscapeSummary};
use crate::ir::expr::ExprKind;
use crate::ir::symbol::Symbol;
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::manager::East3OptimizerPass;
use crate::opt::result::PassResult;

pub use call_graph::{CallGraph, CallSite, ProgramIndex};
pub use closure::{IrBuilder, ModuleClosure, SidecarIrBuilder, load_module_closure};
pub use scc::{recursive_components, strongly_connected_components};
pub use summary::solve_summaries;

use call_graph::{module_functions_mut, visit_calls_mut};

fn annotate(site: &CallSite, summaries: &BTreeMap<Symbol, EscapeSummary>) -> CallsiteAnnotation {
    let callee_summary = if site.resolved {
        site.target.as_ref().and_then(|t| summaries.get(t))
    } else {
        None
    };
    let arity = site.arg_sources.len();
    let (callee_arg_escape, callee_return_from_args, callee_return_escape) = match callee_summary {
        Some(s) => (s.arg_escape.clone(), s.return_from_args.clone(), s.return_escape),
        None if site.pure_builtin => (vec![false; arity], vec![false; arity], false),
        None => (Vec::new(), Vec::new(), false),
    };
    CallsiteAnnotation {
        callee: site.target.as_ref().map(Symbol::to_string).unwrap_or_default(),
        resolved: site.resolved,
        in_return_expr: site.in_return_expr,
        arg_sources: site.arg_sources.clone(),
        callee_arg_escape,
        callee_return_from_args,
        callee_return_escape,
    }
}

/// Computes conservative escape summaries across module boundaries.
pub struct NonEscapeInterproceduralPass {
    builder: Box<dyn IrBuilder>,
}

impl Default for NonEscapeInterproceduralPass {
    fn default() -> Self {
        Self { builder: Box::new(SidecarIrBuilder) }
    }
}

impl NonEscapeInterproceduralPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `builder` to lower dependency sources found on disk.
    pub fn with_builder(builder: impl IrBuilder + 'static) -> Self {
        Self { builder: Box::new(builder) }
    }
}

impl East3OptimizerPass for NonEscapeInterproceduralPass {
    fn name(&self) -> &'static str {
        "NonEscapeInterproceduralPass"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(
        &self,
        document: &mut Module,
        context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>> {
        let closure = load_module_closure(document, self.builder.as_ref());
        let mut result = PassResult::default();
        result.warnings.extend(closure.warnings.iter().cloned());
        let root_id = document.module_id();

        let (summaries, annotations) = {
            let docs = std::iter::once((root_id.as_str(), &*document))
                .chain(closure.modules.iter().map(|(id, doc)| (id.as_str(), doc)));
            let index = ProgramIndex::new(docs);
            if index.functions.is_empty() {
                return Ok(result);
            }
            let graph = CallGraph::build(&index);
            let level = if context.debug_flag("non_escape_trace") { Level::Info } else { Level::Debug };
            for component in recursive_components(&graph.edges) {
                let names: Vec<String> = component.iter().map(Symbol::to_string).collect();
                log!(level, "non_escape: recursive component [{}]", names.join(", "));
            }

            let summaries = solve_summaries(&index, &graph, &context.non_escape_policy);
            let annotations: BTreeMap<Symbol, Vec<CallsiteAnnotation>> = graph
                .sites
                .iter()
                .filter(|(symbol, _)| symbol.module_id == root_id)
                .map(|(symbol, sites)| {
                    let annotated = sites.iter().filter(|s| !s.opaque).map(|s| annotate(s, &summaries));
                    (symbol.clone(), annotated.collect())
                })
                .collect();
            (summaries, annotations)
        };

        let mut annotation_changes = 0;
        for (local, def) in module_functions_mut(&mut document.body) {
            let symbol = Symbol::new(root_id.clone(), local);
            if let Some(summary) = summaries.get(&symbol) {
                if def.meta.escape_summary.as_ref() != Some(summary) {
                    def.meta.escape_summary = Some(summary.clone());
                    annotation_changes += 1;
                }
            }
            let Some(site_annotations) = annotations.get(&symbol) else {
                continue;
            };
            let mut next = site_annotations.iter();
            visit_calls_mut(&mut def.body, &mut |call, _| {
                let Some(annotation) = next.next() else {
                    return;
                };
                if let ExprKind::Call { meta, .. } = &mut call.kind {
                    if meta.non_escape_callsite.as_ref() != Some(annotation) {
                        meta.non_escape_callsite = Some(annotation.clone());
                        annotation_changes += 1;
                    }
                }
            });
        }

        let summary_changed = document.meta.non_escape_summary.as_ref() != Some(&summaries);
        let symbol_count = summaries.len();
        document.meta.non_escape_summary = Some(summaries);

        result.change_count = annotation_changes + if summary_changed { symbol_count } else { 0 };
        result.changed = result.change_count > 0;
        debug!(
            "non_escape: {} symbols, {} modules loaded, {} stubbed, {} missing",
            symbol_count,
            closure.modules.len(),
            closure.stubbed.len(),
            closure.missing.len()
        );
        Ok(result)
    }
}

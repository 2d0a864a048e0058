//! file: core/src/opt/manager.rs
//! description: ordered pass execution with level/override gating and timing.

use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{East3ErrorExt, Level};
use crate::ir::Module;
use crate::opt::context::PassContext;
use crate::opt::err::OptimizerError;
use crate::opt::result::PassResult;

/// A rewrite or analysis over one EAST3 document.
///
/// Passes hold no state between runs and touch nothing outside the
/// document. Returning `Err` aborts the whole optimization run.
pub trait East3OptimizerPass {
    fn name(&self) -> &'static str;

    /// Lowest `opt_level` at which the pass runs without an explicit override.
    fn min_opt_level(&self) -> u8;

    fn run(
        &self,
        document: &mut Module,
        context: &PassContext,
    ) -> Result<PassResult, Box<dyn East3ErrorExt>>;
}

/// One line of the optimizer trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassTrace {
    pub name: String,
    pub enabled: bool,
    pub changed: bool,
    pub change_count: usize,
    pub elapsed_ms: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn East3OptimizerPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn add_pass(&mut self, pass: Box<dyn East3OptimizerPass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Explicit disable beats explicit enable, which beats the level gate.
    pub fn is_enabled(pass: &dyn East3OptimizerPass, context: &PassContext) -> bool {
        let name = pass.name();
        if context.disabled_passes.contains(name) {
            return false;
        }
        if context.enabled_passes.contains(name) {
            return true;
        }
        context.opt_level >= pass.min_opt_level()
    }

    /// Runs every pass in registration order. Disabled passes still get a
    /// trace entry. The first failing pass aborts the run.
    pub fn run(
        &self,
        document: &mut Module,
        context: &PassContext,
    ) -> Result<(PassResult, Vec<PassTrace>), Box<dyn East3ErrorExt>> {
        let mut total = PassResult::default();
        let mut trace = Vec::with_capacity(self.passes.len());

        for pass in &self.passes {
            let name = pass.name();
            if !Self::is_enabled(pass.as_ref(), context) {
                debug!("skipping pass {} (opt_level={})", name, context.opt_level);
                trace.push(PassTrace {
                    name: name.to_string(),
                    enabled: false,
                    changed: false,
                    change_count: 0,
                    elapsed_ms: 0.0,
                    warnings: Vec::new(),
                });
                continue;
            }

            let started = Instant::now();
            let mut result = pass.run(document, context).map_err(|e| {
                Box::new(OptimizerError::with(
                    Level::Error,
                    format!("pass {} failed: {}", name, e.message()),
                    "east3.opt.manager.run".into(),
                    e.location(),
                )) as Box<dyn East3ErrorExt>
            })?;
            result.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            debug!(
                "pass {} changed={} count={} elapsed_ms={:.3}",
                name, result.changed, result.change_count, result.elapsed_ms
            );
            trace.push(PassTrace {
                name: name.to_string(),
                enabled: true,
                changed: result.changed,
                change_count: result.change_count,
                elapsed_ms: result.elapsed_ms,
                warnings: result.warnings.clone(),
            });
            total.merge(&result);
        }

        Ok((total, trace))
    }
}

//! file: core/src/opt/mod.rs
//! description: EAST3 optimizer framework and passes.

pub mod context;
pub mod err;
pub mod manager;
pub mod optimize;
pub mod passes;
pub mod result;
pub mod trace;

pub use context::{NonEscapePolicy, PassContext};
pub use manager::{East3OptimizerPass, PassManager, PassTrace};
pub use optimize::{
    OptLevelArg, OptimizeOptions, OptimizeReport, build_pass_context, optimize_document,
    parse_opt_pass_overrides, resolve_opt_level,
};
pub use passes::default_pass_manager;
pub use result::PassResult;
pub use trace::render_trace;

//! file: core/src/opt/passes/mod.rs
//! description: the built-in EAST3 optimizer passes.

pub mod cast_chain;
pub mod cast_hoist;
pub mod hoist_lite;
pub mod invariance;
pub mod literal_cast_fold;
pub mod loop_var_elision;
pub mod non_escape;
pub mod range_canon;
pub mod reserve_hint;

pub use cast_chain::NumericCastChainReductionPass;
pub use cast_hoist::LoopInvariantCastHoistPass;
pub use hoist_lite::LoopInvariantHoistLitePass;
pub use literal_cast_fold::LiteralCastFoldPass;
pub use loop_var_elision::UnusedLoopVarElisionPass;
pub use non_escape::NonEscapeInterproceduralPass;
pub use range_canon::RangeForCanonicalizationPass;
pub use reserve_hint::SafeReserveHintPass;

use crate::opt::manager::PassManager;

/// The standard pipeline. Order matters: cast cleanup runs before the loop
/// passes see any operand, canonicalized ranges feed the reserve-hint and
/// hoisting passes, and loop variables are elided only once nothing else
/// will read them.
pub fn default_pass_manager() -> PassManager {
    let mut manager = PassManager::new();
    manager
        .add_pass(Box::new(LiteralCastFoldPass))
        .add_pass(Box::new(NumericCastChainReductionPass))
        .add_pass(Box::new(RangeForCanonicalizationPass))
        .add_pass(Box::new(SafeReserveHintPass))
        .add_pass(Box::new(NonEscapeInterproceduralPass::default()))
        .add_pass(Box::new(LoopInvariantCastHoistPass))
        .add_pass(Box::new(UnusedLoopVarElisionPass))
        .add_pass(Box::new(LoopInvariantHoistLitePass));
    manager
}

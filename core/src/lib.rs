pub mod error;
pub mod ir;
pub mod location;
pub mod opt;

pub use error::{East3ErrorExt, Level};
pub use ir::{Module, Symbol};
pub use location::Location;
pub use opt::{
    OptimizeOptions, OptimizeReport, PassContext, PassManager, PassResult, default_pass_manager,
    optimize_document, render_trace,
};

/// One-line human readable rendering of any crate error.
pub fn generate_error_report(error: &dyn East3ErrorExt) -> String {
    let location = match error.location() {
        Some(loc) => loc.to_string(),
        None => "unknown location".to_string(),
    };
    format!("EAST3 | {} | {} | {}", error.level(), location, error.message())
}

/// Reads an EAST3 JSON document, optimizes it and returns the optimized
/// document as JSON together with the run report.
pub fn optimize_json(
    text: &str,
    options: &OptimizeOptions,
) -> Result<(String, OptimizeReport), Box<dyn East3ErrorExt>> {
    let mut document = Module::from_json_str(text)?;
    let report = optimize_document(&mut document, options, None)?;
    Ok((document.to_json_string()?, report))
}

use std::fmt::Write;

use crate::opt::optimize::OptimizeReport;

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Renders a report as the human-readable `east3_optimizer_trace` block.
/// The output always ends with a newline.
pub fn render_trace(report: &OptimizeReport) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "east3_optimizer_trace:");
    let _ = writeln!(out, "  opt_level: {}", report.opt_level);
    let _ = writeln!(out, "  target_lang: {}", report.target_lang);
    let _ = writeln!(out, "  passes:");
    if report.trace.is_empty() {
        let _ = writeln!(out, "    - (none)");
    }
    for item in &report.trace {
        let _ = writeln!(
            out,
            "    - {} enabled={} changed={} count={} elapsed_ms={:.3}",
            item.name,
            flag(item.enabled),
            flag(item.changed),
            item.change_count,
            item.elapsed_ms
        );
    }
    let _ = writeln!(out, "  summary:");
    let _ = writeln!(out, "    changed: {}", flag(report.changed));
    let _ = writeln!(out, "    change_count: {}", report.change_count);
    let _ = writeln!(out, "    elapsed_ms: {:.3}", report.elapsed_ms);
    if report.warnings.is_empty() {
        let _ = writeln!(out, "    warnings: []");
    } else {
        let _ = writeln!(out, "    warnings:");
        for warning in &report.warnings {
            let _ = writeln!(out, "      - {}", warning);
        }
    }
    out
}

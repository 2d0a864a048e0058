//! cli/src/output.rs
//! description: styled diagnostics and trace tables for the east3opt CLI.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use console::Style;
use east3_core::{East3ErrorExt, OptimizeReport, generate_error_report};

/// Styles for the different kinds of CLI output.
pub struct FormatStyle {
    pub info: Style,
    pub warning: Style,
    pub error: Style,
}

impl Default for FormatStyle {
    fn default() -> Self {
        FormatStyle {
            info: Style::new().cyan(),
            warning: Style::new().yellow(),
            error: Style::new().red().bold(),
        }
    }
}

impl FormatStyle {
    pub fn print_error(&self, error: &dyn East3ErrorExt) {
        eprintln!("{} {}", self.error.apply_to("error:"), generate_error_report(error));
    }

    pub fn print_failure(&self, message: &str) {
        eprintln!("{} {}", self.error.apply_to("error:"), message);
    }

    pub fn print_warning(&self, message: &str) {
        eprintln!("{} {}", self.warning.apply_to("warning:"), message);
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Tabular rendering of a report: one row per pass, then a total row.
pub fn trace_table(report: &OptimizeReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["pass", "enabled", "changed", "count", "elapsed_ms"]);
    for item in &report.trace {
        table.add_row(vec![
            Cell::new(&item.name),
            Cell::new(yes_no(item.enabled)),
            Cell::new(yes_no(item.changed)),
            Cell::new(item.change_count).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", item.elapsed_ms)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(""),
        Cell::new(yes_no(report.changed)),
        Cell::new(report.change_count).set_alignment(CellAlignment::Right),
        Cell::new(format!("{:.3}", report.elapsed_ms)).set_alignment(CellAlignment::Right),
    ]);
    format!(
        "opt_level: {}  target_lang: {}\n{}\n",
        report.opt_level, report.target_lang, table
    )
}

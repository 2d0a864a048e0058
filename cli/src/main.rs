mod output;

use clap::{Arg, ArgAction, ArgMatches, Command};
use east3_core::ir::Module;
use east3_core::opt::passes::non_escape::{
    CallGraph, ProgramIndex, SidecarIrBuilder, load_module_closure, recursive_components,
    strongly_connected_components,
};
use east3_core::opt::{OptLevelArg, OptimizeOptions, optimize_document, render_trace};
use log::LevelFilter;
use output::{FormatStyle, trace_table};
use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Command::new("east3opt")
        .version("0.1.0")
        .about("Optimizer for EAST3 module documents");

    let cli = setup_cli(cli);
    let matches = cli.get_matches();
    init_logging(&matches);
    dispatch_commands(&matches)
}

/// Sets up the subcommands and their arguments.
fn setup_cli(cli: Command) -> Command {
    cli.arg(
        Arg::new("verbose")
            .help("Log analysis details (repeat for more)")
            .short('v')
            .long("verbose")
            .global(true)
            .action(ArgAction::Count),
    )
    .subcommand(
        Command::new("optimize")
            .about("Run the optimizer pipeline over an EAST3 JSON document")
            .arg(
                Arg::new("file")
                    .help("The EAST3 document to optimize")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("opt-level")
                    .help("Optimization level (0, 1 or 2)")
                    .short('O')
                    .value_name("LEVEL")
                    .default_value("1"),
            )
            .arg(
                Arg::new("target")
                    .help("Target language the document will be emitted to")
                    .long("target")
                    .value_name("LANG")
                    .default_value(""),
            )
            .arg(
                Arg::new("opt-pass")
                    .help("Pass overrides, e.g. +PassA,-PassB")
                    .long("opt-pass")
                    .value_name("SPEC")
                    .allow_hyphen_values(true)
                    .default_value(""),
            )
            .arg(
                Arg::new("output")
                    .help("Write the optimized document here instead of stdout")
                    .short('o')
                    .long("output")
                    .value_name("FILE"),
            )
            .arg(
                Arg::new("trace")
                    .help("Print the optimizer trace to stderr")
                    .long("trace")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("trace-format")
                    .help("Trace layout")
                    .long("trace-format")
                    .value_parser(["text", "table"])
                    .default_value("text"),
            )
            .arg(
                Arg::new("report")
                    .help("Write the JSON run report to this file")
                    .long("report")
                    .value_name("FILE"),
            )
            .arg(
                Arg::new("policy")
                    .help("Non-escape policy override, e.g. unknown_call_escape=false")
                    .long("policy")
                    .value_name("KEY=BOOL")
                    .action(ArgAction::Append),
            ),
    )
    .subcommand(
        Command::new("sccs")
            .about("List the call-graph components of a document and its imports")
            .arg(
                Arg::new("file")
                    .help("The EAST3 document to inspect")
                    .required(true)
                    .index(1),
            ),
    )
}

fn init_logging(matches: &ArgMatches) {
    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Dispatches the command based on the parsed arguments.
fn dispatch_commands(matches: &ArgMatches) -> ExitCode {
    let style = FormatStyle::default();
    let outcome = match matches.subcommand() {
        Some(("optimize", sub_m)) => run_optimize(sub_m, &style),
        Some(("sccs", sub_m)) => run_sccs(sub_m, &style),
        _ => {
            println!("No valid subcommand was used. Use --help for more information.");
            return ExitCode::from(2);
        }
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn load_document(path: &str, style: &FormatStyle) -> Result<Module, ()> {
    let text = fs::read_to_string(path).map_err(|e| {
        style.print_failure(&format!("cannot read {}: {}", path, e));
    })?;
    Module::from_json_str(&text).map_err(|e| style.print_error(e.as_ref()))
}

fn write_or_print(path: Option<&String>, text: &str, style: &FormatStyle) -> Result<(), ()> {
    match path {
        Some(path) => fs::write(path, text).map_err(|e| {
            style.print_failure(&format!("cannot write {}: {}", path, e));
        }),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

/// Parses repeated `key=bool` policy overrides into a JSON map.
fn policy_overrides(sub_m: &ArgMatches, style: &FormatStyle) -> Option<serde_json::Map<String, serde_json::Value>> {
    let items = sub_m.get_many::<String>("policy")?;
    let mut map = serde_json::Map::new();
    for item in items {
        match item.split_once('=') {
            Some((key, "true")) => {
                map.insert(key.trim().to_string(), serde_json::Value::Bool(true));
            }
            Some((key, "false")) => {
                map.insert(key.trim().to_string(), serde_json::Value::Bool(false));
            }
            _ => style.print_warning(&format!("ignoring policy override {}", item)),
        }
    }
    Some(map)
}

fn run_optimize(sub_m: &ArgMatches, style: &FormatStyle) -> Result<(), ()> {
    let file = sub_m.get_one::<String>("file").ok_or(())?;
    let mut document = load_document(file, style)?;

    let options = OptimizeOptions {
        opt_level: OptLevelArg::Text(sub_m.get_one::<String>("opt-level").cloned().unwrap_or_default()),
        target_lang: sub_m.get_one::<String>("target").cloned().unwrap_or_default(),
        opt_pass_spec: sub_m.get_one::<String>("opt-pass").cloned().unwrap_or_default(),
        non_escape_policy: policy_overrides(sub_m, style),
        ..OptimizeOptions::default()
    };
    let report = optimize_document(&mut document, &options, None).map_err(|e| style.print_error(e.as_ref()))?;

    for warning in &report.warnings {
        style.print_warning(warning);
    }
    if sub_m.get_flag("trace") {
        let trace = match sub_m.get_one::<String>("trace-format").map(String::as_str) {
            Some("table") => trace_table(&report),
            _ => render_trace(&report),
        };
        eprint!("{}", trace);
    }
    if let Some(path) = sub_m.get_one::<String>("report") {
        let text = serde_json::to_string_pretty(&report).map_err(|e| {
            style.print_failure(&format!("cannot serialize report: {}", e));
        })?;
        write_or_print(Some(path), &text, style)?;
    }

    let text = document.to_json_string().map_err(|e| style.print_error(e.as_ref()))?;
    write_or_print(sub_m.get_one::<String>("output"), &text, style)
}

fn run_sccs(sub_m: &ArgMatches, style: &FormatStyle) -> Result<(), ()> {
    let file = sub_m.get_one::<String>("file").ok_or(())?;
    let document = load_document(file, style)?;
    document.validate().map_err(|e| style.print_error(e.as_ref()))?;

    let closure = load_module_closure(&document, &SidecarIrBuilder);
    for warning in &closure.warnings {
        style.print_warning(warning);
    }
    let root_id = document.module_id();
    let docs = std::iter::once((root_id.as_str(), &document))
        .chain(closure.modules.iter().map(|(id, doc)| (id.as_str(), doc)));
    let index = ProgramIndex::new(docs);
    let graph = CallGraph::build(&index);

    let recursive = recursive_components(&graph.edges);
    for component in strongly_connected_components(&graph.edges) {
        let names: Vec<String> = component.iter().map(ToString::to_string).collect();
        if recursive.contains(&component) {
            println!("{} {}", style.info.apply_to("recursive"), names.join(", "));
        } else {
            println!("{}", names.join(", "));
        }
    }
    for missing in &closure.missing {
        style.print_warning(&format!("module {} not found", missing));
    }
    Ok(())
}

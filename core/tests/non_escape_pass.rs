use std::fs;
use std::path::Path;

use east3_core::ir::annotation::CallsiteAnnotation;
use east3_core::ir::stmt::ClassDef;
use east3_core::ir::{EscapeSummary, Expr, ExprKind, FunctionDef, ImportBinding, Module, Stmt, Symbol};
use east3_core::ir::stmt::{ForCore, IterPlan, TargetPlan};
use east3_core::opt::passes::non_escape::call_graph::visit_calls;
use east3_core::opt::passes::non_escape::summary::seed_summary;
use east3_core::opt::passes::non_escape::{CallGraph, ProgramIndex, solve_summaries};
use east3_core::opt::passes::NonEscapeInterproceduralPass;
use east3_core::opt::{
    East3OptimizerPass, OptimizeOptions, PassContext, PassResult, optimize_document, render_trace,
};
use serde_json::json;

fn func(name: &str, args: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::FunctionDef(FunctionDef::new(name, args, body))
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::name(name), args)
}

fn ret(value: Expr) -> Stmt {
    Stmt::ret(Some(value))
}

fn run(document: &mut Module) -> PassResult {
    NonEscapeInterproceduralPass::default()
        .run(document, &PassContext::default())
        .expect("pass failed")
}

fn summary<'a>(document: &'a Module, symbol: &str) -> &'a EscapeSummary {
    let symbol: Symbol = symbol.parse().expect("symbol");
    &document.meta.non_escape_summary.as_ref().expect("summary map")[&symbol]
}

/// Call-site annotations of top-level function `name`, in pre-order.
fn callsites(document: &Module, name: &str) -> Vec<CallsiteAnnotation> {
    let def = document
        .body
        .iter()
        .find_map(|stmt| match stmt {
            Stmt::FunctionDef(def) if def.name == name => Some(def),
            _ => None,
        })
        .expect("function");
    let mut out = Vec::new();
    visit_calls(&def.body, &mut |expr, _| {
        if let ExprKind::Call { meta, .. } = &expr.kind {
            out.push(meta.non_escape_callsite.clone().expect("annotated call"));
        }
    });
    out
}

fn chain_module() -> Module {
    Module::new(
        "app",
        vec![
            func("identity", &["x"], vec![ret(Expr::name("x"))]),
            func("wrap", &["y"], vec![ret(call("identity", vec![Expr::name("y")]))]),
            func("wrap2", &["z"], vec![ret(call("wrap", vec![Expr::name("z")]))]),
        ],
    )
}

#[test]
fn return_from_args_flows_through_wrappers() {
    let mut document = chain_module();
    let result = run(&mut document);

    for name in ["app::identity", "app::wrap", "app::wrap2"] {
        let s = summary(&document, name);
        assert_eq!(s.return_from_args, vec![true], "{}", name);
        assert!(s.return_escape, "{}", name);
        assert_eq!(s.arg_escape, vec![false], "{}", name);
    }

    // 3 summaries + 3 function annotations + 2 call sites
    assert!(result.changed);
    assert_eq!(result.change_count, 8);

    let sites = callsites(&document, "wrap2");
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].callee, "app::wrap");
    assert!(sites[0].resolved);
    assert!(sites[0].in_return_expr);
    assert_eq!(sites[0].arg_sources, vec![vec![0]]);
    assert_eq!(sites[0].callee_return_from_args, vec![true]);

    let Stmt::FunctionDef(def) = &document.body[0] else {
        panic!("expected FunctionDef");
    };
    assert_eq!(def.meta.escape_summary.as_ref(), Some(summary(&document, "app::identity")));
}

#[test]
fn second_run_reports_no_change() {
    let mut document = chain_module();
    run(&mut document);
    let snapshot = document.clone();
    let again = run(&mut document);
    assert!(!again.changed);
    assert_eq!(again.change_count, 0);
    assert_eq!(document, snapshot);
}

#[test]
fn unknown_call_policy_controls_direct_escape() {
    let build = || {
        Module::new(
            "app",
            vec![func("sink", &["x"], vec![Stmt::expr(call("unknown_sink", vec![Expr::name("x")]))])],
        )
    };

    let mut strict = build();
    run(&mut strict);
    let s = summary(&strict, "app::sink");
    assert_eq!(s.arg_escape, vec![true]);
    assert!(s.return_escape);
    assert_eq!(s.unresolved_calls, 1);

    let mut relaxed = build();
    let mut context = PassContext::default();
    context.non_escape_policy.unknown_call_escape = false;
    NonEscapeInterproceduralPass::default().run(&mut relaxed, &context).unwrap();
    let s = summary(&relaxed, "app::sink");
    assert_eq!(s.arg_escape, vec![false]);
    assert!(!s.return_escape);

    let sites = callsites(&relaxed, "sink");
    assert_eq!(sites[0].callee, "");
    assert!(!sites[0].resolved);
    assert!(sites[0].callee_arg_escape.is_empty());
}

#[test]
fn mutual_recursion_converges() {
    let mut document = Module::new(
        "app",
        vec![
            func("a", &["x"], vec![ret(call("b", vec![Expr::name("x")]))]),
            func(
                "b",
                &["y"],
                vec![
                    Stmt::expr(call("unknown_sink", vec![Expr::name("y")])),
                    ret(call("a", vec![Expr::name("y")])),
                ],
            ),
        ],
    );
    run(&mut document);
    for name in ["app::a", "app::b"] {
        let s = summary(&document, name);
        assert_eq!(s.arg_escape, vec![true], "{}", name);
        assert_eq!(s.return_from_args, vec![true], "{}", name);
        assert!(s.return_escape, "{}", name);
    }
    let b_sites = callsites(&document, "b");
    assert!(!b_sites[0].resolved);
    assert!(!b_sites[0].in_return_expr);
    assert_eq!(b_sites[1].callee, "app::a");
    assert!(b_sites[1].resolved);
}

#[test]
fn pure_builtins_get_all_false_callee_vectors() {
    let mut document = Module::new(
        "app",
        vec![func(
            "size",
            &["items"],
            vec![ret(Expr::builtin_call("len", "py_len", vec![Expr::name("items")]))],
        )],
    );
    run(&mut document);
    let sites = callsites(&document, "size");
    assert!(!sites[0].resolved);
    assert_eq!(sites[0].callee_arg_escape, vec![false]);
    assert_eq!(sites[0].callee_return_from_args, vec![false]);
    assert!(!sites[0].callee_return_escape);
}

#[test]
fn self_method_calls_resolve_within_class() {
    let class = Stmt::ClassDef(ClassDef {
        name: "Box".into(),
        base: None,
        body: vec![
            func(
                "get",
                &["self", "v"],
                vec![ret(Expr::call(Expr::attribute(Expr::name("self"), "pick"), vec![Expr::name("v")]))],
            ),
            func("pick", &["self", "w"], vec![ret(Expr::name("w"))]),
        ],
    });
    let mut document = Module::new("app", vec![class]);
    run(&mut document);

    let s = summary(&document, "app::Box.get");
    // the receiver is mentioned by the returned call as well
    assert_eq!(s.return_from_args, vec![true, true]);
    assert_eq!(s.unresolved_calls, 0);
    let Stmt::ClassDef(class) = &document.body[0] else {
        panic!("expected ClassDef");
    };
    let Stmt::FunctionDef(get) = &class.body[0] else {
        panic!("expected FunctionDef");
    };
    assert!(get.meta.escape_summary.is_some());
}

fn lib_module() -> Module {
    Module::new("lib", vec![func("keep", &["x"], vec![ret(Expr::name("x"))])])
}

#[test]
fn presupplied_closure_resolves_imported_symbols() {
    let mut document = Module::new(
        "app",
        vec![func("f", &["y"], vec![ret(call("keep", vec![Expr::name("y")]))])],
    )
    .with_import(ImportBinding::symbol("pkg", "keep", "keep"));

    // `pkg` only re-exports `keep` from `lib`
    let pkg = Module::new("", Vec::new()).with_import(ImportBinding::symbol("lib", "keep", "keep"));
    document.meta.non_escape_import_closure.insert("pkg".into(), pkg);
    document.meta.non_escape_import_closure.insert("lib".into(), lib_module());

    let result = run(&mut document);
    assert!(result.warnings.is_empty());
    let sites = callsites(&document, "f");
    assert_eq!(sites[0].callee, "lib::keep");
    assert!(sites[0].resolved);
    assert_eq!(summary(&document, "app::f").return_from_args, vec![true]);
    assert!(document.meta.non_escape_summary.as_ref().unwrap().contains_key(&Symbol::new("lib", "keep")));
}

#[test]
fn sidecar_documents_are_loaded_from_disk() {
    let td = tempfile::tempdir().expect("tempdir");
    let dir = td.path();
    fs::write(dir.join("lib.py"), "def keep(x):\n    return x\n").expect("write lib.py");
    fs::write(dir.join("lib.east3.json"), lib_module().to_json_string().unwrap()).expect("write sidecar");

    let mut document = Module::new(
        "app",
        vec![func(
            "f",
            &["y"],
            vec![ret(Expr::call(Expr::attribute(Expr::name("lib"), "keep"), vec![Expr::name("y")]))],
        )],
    )
    .with_source_path(dir.join("app.py").display().to_string())
    .with_import(ImportBinding::module("lib", "lib"));

    run(&mut document);
    let sites = callsites(&document, "f");
    assert_eq!(sites[0].callee, "lib::keep");
    assert!(sites[0].resolved);
}

#[test]
fn unbuildable_package_falls_back_to_import_stub() {
    let td = tempfile::tempdir().expect("tempdir");
    let dir = td.path();
    fs::create_dir_all(dir.join("pkg")).expect("mkdir");
    fs::write(dir.join("pkg/__init__.py"), "from .impl import keep\n").expect("write init");
    fs::write(dir.join("pkg/impl.py"), "def keep(x):\n    return x\n").expect("write impl");
    let mut impl_doc = lib_module();
    impl_doc.meta.module_id = "pkg.impl".into();
    fs::write(dir.join("pkg/impl.east3.json"), impl_doc.to_json_string().unwrap()).expect("write sidecar");

    let mut document = Module::new(
        "app",
        vec![func("f", &["y"], vec![ret(call("keep", vec![Expr::name("y")]))])],
    )
    .with_source_path(dir.join("app.py").display().to_string())
    .with_import(ImportBinding::symbol("pkg", "keep", "keep"));

    let result = run(&mut document);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("import-only stub for pkg"), "{}", result.warnings[0]);

    let sites = callsites(&document, "f");
    assert_eq!(sites[0].callee, "pkg.impl::keep");
    assert!(sites[0].resolved);
}

#[test]
fn missing_modules_keep_candidate_callee_unresolved() {
    let td = tempfile::tempdir().expect("tempdir");
    let builder = |_path: &Path| -> Result<Module, String> { Err("unexpected".into()) };

    let mut document = Module::new(
        "app",
        vec![func("f", &["y"], vec![ret(call("helper", vec![Expr::name("y")]))])],
    )
    .with_source_path(td.path().join("app.py").display().to_string())
    .with_import(ImportBinding::symbol("ghost", "helper", "helper"));

    let result = NonEscapeInterproceduralPass::with_builder(builder)
        .run(&mut document, &PassContext::default())
        .unwrap();
    assert!(result.warnings.is_empty());

    let sites = callsites(&document, "f");
    assert_eq!(sites[0].callee, "ghost::helper");
    assert!(!sites[0].resolved);
    assert_eq!(summary(&document, "app::f").arg_escape, vec![true]);
}

/// `Box(<id>)`, a node kind read as opaque.
fn boxed(id: &str) -> Expr {
    serde_json::from_value(json!({"kind": "Box", "value": {"kind": "Name", "id": id}})).expect("opaque expression")
}

#[test]
fn opaque_nodes_act_as_unresolved_calls() {
    let build = || {
        Module::new(
            "app",
            vec![
                func("stash", &["x", "y"], vec![Stmt::expr(boxed("x")), ret(Expr::name("y"))]),
                func("wrap", &["z"], vec![ret(boxed("z"))]),
            ],
        )
    };

    let mut strict = build();
    run(&mut strict);
    let s = summary(&strict, "app::stash");
    assert_eq!(s.arg_escape, vec![true, false]);
    assert_eq!(s.return_from_args, vec![false, true]);
    assert_eq!(s.unresolved_calls, 1);
    let s = summary(&strict, "app::wrap");
    assert_eq!(s.arg_escape, vec![true]);
    assert_eq!(s.return_from_args, vec![true]);
    assert!(callsites(&strict, "stash").is_empty());

    let mut relaxed = build();
    let mut context = PassContext::default();
    context.non_escape_policy.unknown_call_escape = false;
    NonEscapeInterproceduralPass::default().run(&mut relaxed, &context).unwrap();
    assert_eq!(summary(&relaxed, "app::stash").arg_escape, vec![false, false]);
}

#[test]
fn solved_summaries_only_grow_from_seeds() {
    let document = Module::new(
        "app",
        vec![
            func("a", &["x", "p"], vec![ret(call("b", vec![Expr::name("x"), Expr::name("p")]))]),
            func(
                "b",
                &["y", "q"],
                vec![
                    Stmt::expr(call("unknown_sink", vec![Expr::name("q")])),
                    ret(call("a", vec![Expr::name("y"), Expr::int(0)])),
                ],
            ),
            func("c", &["w"], vec![Stmt::expr(call("a", vec![Expr::int(1), Expr::name("w")]))]),
        ],
    );
    let policy = PassContext::default().non_escape_policy;
    let index = ProgramIndex::new([("app", &document)]);
    let graph = CallGraph::build(&index);
    let solved = solve_summaries(&index, &graph, &policy);

    let implies = |seed: &[bool], fin: &[bool]| seed.iter().zip(fin).all(|(s, f)| !*s || *f);
    for (symbol, def) in &index.functions {
        let seed = seed_summary(symbol, def, &graph.sites[symbol], graph.unresolved[symbol], &policy);
        let fin = &solved[symbol];
        assert!(implies(&seed.arg_escape, &fin.arg_escape), "{}", symbol);
        assert!(implies(&seed.return_from_args, &fin.return_from_args), "{}", symbol);
        assert!(!seed.return_escape || fin.return_escape, "{}", symbol);
        assert_eq!(seed.unresolved_calls, fin.unresolved_calls, "{}", symbol);
    }
    // escape through `b` reaches `c` via `a`
    assert_eq!(solved[&Symbol::new("app", "c")].arg_escape, vec![true]);
}

#[test]
fn optimizing_twice_gives_identical_output() {
    let loop_body = vec![
        Stmt::assign(Expr::name("scale"), Expr::binop("Mult", Expr::name("k"), Expr::int(2))),
        Stmt::expr(Expr::call(
            Expr::attribute(Expr::name("out"), "append"),
            vec![Expr::builtin_call("float", "static_cast", vec![Expr::name("k")]).with_type("float64")],
        )),
    ];
    let build = || {
        Module::new(
            "app",
            vec![
                func(
                    "fill",
                    &["out", "k"],
                    vec![Stmt::ForCore(ForCore {
                        iter_mode: "runtime_protocol".into(),
                        iter_plan: IterPlan::RuntimeIterForPlan {
                            iter_expr: Expr::builtin_call("range", "py_range", vec![Expr::int(8)]),
                        },
                        target_plan: TargetPlan::NameTarget { id: "i".into(), target_type: None },
                        body: loop_body.clone(),
                        orelse: Vec::new(),
                        reserve_hints: Vec::new(),
                    })],
                ),
                func("wrap", &["y"], vec![ret(call("fill", vec![Expr::name("y"), Expr::int(3)]))]),
            ],
        )
    };
    let options = OptimizeOptions { opt_level: 2i64.into(), ..OptimizeOptions::default() };

    let outputs: Vec<(String, String)> = (0..2)
        .map(|_| {
            let mut document = build();
            let mut report = optimize_document(&mut document, &options, None).expect("optimize");
            report.elapsed_ms = 0.0;
            report.trace.iter_mut().for_each(|t| t.elapsed_ms = 0.0);
            (document.to_json_string().expect("json"), render_trace(&report))
        })
        .collect();
    assert_eq!(outputs[0], outputs[1]);
    assert!(outputs[0].1.contains("LoopInvariantHoistLitePass enabled=true changed=true"), "{}", outputs[0].1);
}

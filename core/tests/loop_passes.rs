use east3_core::ir::expr::CastRule;
use east3_core::ir::{Comprehension, Expr, ExprKind, ForCore, FunctionDef, IterPlan, Module, Stmt, TargetPlan};
use east3_core::opt::passes::{
    LiteralCastFoldPass, LoopInvariantCastHoistPass, LoopInvariantHoistLitePass, NumericCastChainReductionPass,
    RangeForCanonicalizationPass, SafeReserveHintPass, UnusedLoopVarElisionPass,
};
use east3_core::opt::{East3OptimizerPass, PassContext, PassResult};
use serde_json::json;

fn run(pass: &dyn East3OptimizerPass, body: Vec<Stmt>) -> (Module, PassResult) {
    let mut document = Module::new("loops", body);
    let result = pass.run(&mut document, &PassContext::default()).expect("pass failed");
    (document, result)
}

fn static_loop(start: Expr, stop: Expr, step: i64, body: Vec<Stmt>) -> Stmt {
    Stmt::ForCore(ForCore {
        iter_mode: "static_fastpath".into(),
        iter_plan: IterPlan::StaticRangeForPlan {
            start,
            stop,
            step: Expr::int(step),
            range_mode: String::new(),
        },
        target_plan: TargetPlan::NameTarget { id: "i".into(), target_type: Some("int64".into()) },
        body,
        orelse: Vec::new(),
        reserve_hints: Vec::new(),
    })
}

fn static_loop_mode(start: Expr, stop: Expr, step: i64, range_mode: &str, body: Vec<Stmt>) -> Stmt {
    let mut stmt = static_loop(start, stop, step, body);
    if let Stmt::ForCore(ForCore { iter_plan: IterPlan::StaticRangeForPlan { range_mode: mode, .. }, .. }) = &mut stmt {
        *mode = range_mode.to_string();
    }
    stmt
}

fn range_loop(args: Vec<Expr>) -> Stmt {
    Stmt::ForCore(ForCore {
        iter_mode: "runtime_protocol".into(),
        iter_plan: IterPlan::RuntimeIterForPlan {
            iter_expr: Expr::builtin_call("range", "py_range", args),
        },
        target_plan: TargetPlan::NameTarget { id: "i".into(), target_type: None },
        body: vec![Stmt::Pass],
        orelse: Vec::new(),
        reserve_hints: Vec::new(),
    })
}

fn append(owner: &str, value: Expr) -> Stmt {
    Stmt::expr(Expr::call(Expr::attribute(Expr::name(owner), "append"), vec![value]))
}

fn for_core(stmt: &Stmt) -> &ForCore {
    match stmt {
        Stmt::ForCore(fc) => fc,
        other => panic!("expected ForCore, got {:?}", other),
    }
}

fn float_cast(arg: Expr) -> Expr {
    Expr::builtin_call("float", "static_cast", vec![arg]).with_type("float64")
}

#[test]
fn range_call_becomes_static_plan() {
    let (document, result) = run(&RangeForCanonicalizationPass, vec![range_loop(vec![Expr::int(5)])]);
    assert_eq!(result.change_count, 1);
    let fc = for_core(&document.body[0]);
    assert_eq!(fc.iter_mode, "static_fastpath");
    let IterPlan::StaticRangeForPlan { start, stop, step, range_mode } = &fc.iter_plan else {
        panic!("expected static plan");
    };
    assert_eq!(start.const_int(), Some(0));
    assert_eq!(stop.const_int(), Some(5));
    assert_eq!(step.const_int(), Some(1));
    assert_eq!(range_mode, "ascending");
}

#[test]
fn range_with_zero_step_or_untyped_bound_is_left_alone() {
    let zero_step = range_loop(vec![Expr::int(0), Expr::int(4), Expr::int(0)]);
    let untyped = range_loop(vec![Expr::name("n")]);
    let typed = range_loop(vec![Expr::name("n").with_type("int64"), Expr::int(0), Expr::int(-1)]);
    let (document, result) = run(&RangeForCanonicalizationPass, vec![zero_step, untyped, typed]);
    assert_eq!(result.change_count, 1);
    assert!(matches!(for_core(&document.body[0]).iter_plan, IterPlan::RuntimeIterForPlan { .. }));
    assert!(matches!(for_core(&document.body[1]).iter_plan, IterPlan::RuntimeIterForPlan { .. }));
    let IterPlan::StaticRangeForPlan { range_mode, .. } = &for_core(&document.body[2]).iter_plan else {
        panic!("expected static plan");
    };
    assert_eq!(range_mode, "descending");
}

#[test]
fn unconditional_append_gets_reserve_hint() {
    let body = vec![static_loop(Expr::int(0), Expr::name("n"), 2, vec![append("out", Expr::name("i"))])];
    let (document, result) = run(&SafeReserveHintPass, body);
    assert_eq!(result.change_count, 1);

    let hints = &for_core(&document.body[0]).reserve_hints;
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].owner, "out");
    assert_eq!(hints[0].kind, "StaticRangeReserveHint");
    assert!(hints[0].safe);
    assert_eq!(hints[0].count_expr.to_string(), "(0 if (n <= 0) else (((n - 0) + 1) / 2))");
}

#[test]
fn guarded_append_gets_no_hint_and_stale_hints_are_cleared() {
    let guarded = vec![Stmt::If {
        test: Expr::name("flag"),
        body: vec![append("out", Expr::name("i"))],
        orelse: Vec::new(),
    }];
    let (mut document, result) = run(&SafeReserveHintPass, vec![static_loop(Expr::int(0), Expr::name("n"), 1, guarded)]);
    assert_eq!(result.change_count, 0);
    assert!(for_core(&document.body[0]).reserve_hints.is_empty());

    // a hint left over from an earlier run on a loop that no longer qualifies
    let Stmt::ForCore(fc) = &mut document.body[0] else {
        panic!("expected ForCore");
    };
    fc.reserve_hints.push(east3_core::ir::ReserveHint::static_range("out", Expr::name("n")));
    let result = SafeReserveHintPass.run(&mut document, &PassContext::default()).unwrap();
    assert_eq!(result.change_count, 1);
    assert!(for_core(&document.body[0]).reserve_hints.is_empty());
}

#[test]
fn invariant_cast_is_hoisted_once() {
    let body = vec![static_loop(
        Expr::int(0),
        Expr::name("n"),
        1,
        vec![
            append("out", Expr::binop("Mult", float_cast(Expr::name("k")), Expr::name("x"))),
            append("out", float_cast(Expr::name("k"))),
            append("out", float_cast(Expr::name("i"))),
        ],
    )];
    let (document, result) = run(&LoopInvariantCastHoistPass, body);
    assert_eq!(result.change_count, 2);
    assert_eq!(document.body.len(), 2);

    let Stmt::AnnAssign { target, value: Some(value), decl_type, .. } = &document.body[0] else {
        panic!("expected hoisted declaration");
    };
    assert_eq!(target.name_id(), Some("__hoisted_cast_1"));
    assert_eq!(decl_type.as_deref(), Some("float64"));
    assert_eq!(value.to_string(), "static_cast<float64>(k)");

    let fc = for_core(&document.body[1]);
    let Stmt::Expr { value } = &fc.body[1] else {
        panic!("expected append");
    };
    let ExprKind::Call { args, .. } = &value.kind else {
        panic!("expected call");
    };
    assert_eq!(args[0].name_id(), Some("__hoisted_cast_1"));

    // the cast of the loop variable stays in place
    let Stmt::Expr { value } = &fc.body[2] else {
        panic!("expected append");
    };
    assert_eq!(value.to_string(), "out.append(static_cast<float64>(i))");
}

#[test]
fn mutated_names_block_hoisting() {
    let body = vec![static_loop(
        Expr::int(0),
        Expr::int(8),
        1,
        vec![
            Stmt::assign(Expr::name("k"), Expr::name("i")),
            append("out", float_cast(Expr::name("k"))),
        ],
    )];
    let (document, result) = run(&LoopInvariantCastHoistPass, body);
    assert!(!result.changed);
    assert_eq!(document.body.len(), 1);
}

#[test]
fn binop_right_promotion_is_hoisted() {
    let mut scaled = Expr::binop("Mult", Expr::name("x").with_type("float64"), Expr::name("k").with_type("int64"))
        .with_type("float64");
    scaled.casts.push(CastRule {
        on: "right".into(),
        from: "int64".into(),
        to: "float64".into(),
        reason: Some("numeric_promotion".into()),
    });
    let body = vec![static_loop(Expr::int(0), Expr::name("n"), 1, vec![append("out", scaled)])];
    let (document, result) = run(&LoopInvariantCastHoistPass, body);
    assert_eq!(result.change_count, 1);

    let Stmt::AnnAssign { value: Some(value), .. } = &document.body[0] else {
        panic!("expected hoisted declaration");
    };
    assert_eq!(value.to_string(), "static_cast<float64>(k)");

    let fc = for_core(&document.body[1]);
    let Stmt::Expr { value } = &fc.body[0] else {
        panic!("expected append");
    };
    let ExprKind::Call { args, .. } = &value.kind else {
        panic!("expected call");
    };
    let ExprKind::BinOp { right, .. } = &args[0].kind else {
        panic!("expected BinOp");
    };
    assert_eq!(right.name_id(), Some("__hoisted_cast_1"));
    assert!(args[0].casts.is_empty());
}

#[test]
fn dynamic_name_access_disables_hoisting() {
    let body = vec![static_loop(
        Expr::int(0),
        Expr::name("n"),
        1,
        vec![
            Stmt::expr(Expr::call(Expr::name("locals"), Vec::new())),
            append("out", float_cast(Expr::name("k"))),
        ],
    )];
    let (_, result) = run(&LoopInvariantCastHoistPass, body);
    assert_eq!(result.change_count, 0);
}

/// Evaluates a trip-count expression with every name bound to `n`.
fn eval_count(expr: &Expr, n: i64) -> i64 {
    match &expr.kind {
        ExprKind::Constant { .. } => expr.const_int().expect("int constant"),
        ExprKind::Name { .. } => n,
        ExprKind::BinOp { op, left, right } => {
            let (l, r) = (eval_count(left, n), eval_count(right, n));
            match op.as_str() {
                "Add" => l + r,
                "Sub" => l - r,
                "Div" => l / r,
                other => panic!("unexpected op {}", other),
            }
        }
        ExprKind::Compare { left, ops, comparators } => {
            let (l, r) = (eval_count(left, n), eval_count(&comparators[0], n));
            let holds = match ops[0].as_str() {
                "LtE" => l <= r,
                "GtE" => l >= r,
                other => panic!("unexpected comparison {}", other),
            };
            i64::from(holds)
        }
        ExprKind::IfExp { test, body, orelse } => {
            if eval_count(test, n) != 0 { eval_count(body, n) } else { eval_count(orelse, n) }
        }
        other => panic!("unexpected node {:?}", other),
    }
}

#[test]
fn trip_counts_match_python_ranges() {
    let cases: [(Expr, Expr, i64, i64, i64); 4] = [
        (Expr::int(0), Expr::name("n"), 2, 10, 5),
        (Expr::int(0), Expr::name("n"), 2, -3, 0),
        (Expr::name("n"), Expr::int(0), -1, 4, 4),
        (Expr::name("n"), Expr::int(1), -3, 10, 3),
    ];
    for (start, stop, step, n, expected) in cases {
        let body = vec![static_loop(start, stop, step, vec![append("out", Expr::name("i"))])];
        let (document, _) = run(&SafeReserveHintPass, body);
        let hint = &for_core(&document.body[0]).reserve_hints[0];
        assert_eq!(eval_count(&hint.count_expr, n), expected, "step {} n {}", step, n);
    }
}

fn loop_var(stmt: &Stmt) -> &str {
    match &for_core(stmt).target_plan {
        TargetPlan::NameTarget { id, .. } => id,
        other => panic!("expected NameTarget, got {:?}", other),
    }
}

/// `Box(k)`: a node kind the typed model reads as opaque.
fn boxed(id: &str) -> Expr {
    serde_json::from_value(json!({"kind": "Box", "value": {"kind": "Name", "id": id}, "resolved_type": "object"}))
        .expect("opaque expression")
}

#[test]
fn casts_over_nested_scope_names_stay_in_loop() {
    let comprehension = Expr::new(ExprKind::ListComp {
        elt: Box::new(float_cast(Expr::name("k"))),
        generators: vec![Comprehension { target: Expr::name("k"), iter: Expr::name("xs"), ifs: Vec::new() }],
    });
    let lambda = Expr::new(ExprKind::Lambda {
        arg_order: vec!["k".into()],
        body: Box::new(float_cast(Expr::name("k"))),
    });
    let nested_def = Stmt::FunctionDef(FunctionDef::new("g", &["k"], vec![Stmt::ret(Some(float_cast(Expr::name("k"))))]));

    let bodies = [
        vec![Stmt::assign(Expr::name("ys"), comprehension)],
        vec![Stmt::assign(Expr::name("f"), lambda)],
        vec![nested_def],
    ];
    for body in bodies {
        let (document, result) = run(&LoopInvariantCastHoistPass, vec![static_loop(Expr::int(0), Expr::name("n"), 1, body)]);
        assert_eq!(result.change_count, 0, "{:?}", document.body[0]);
        assert_eq!(document.body.len(), 1);
    }
}

#[test]
fn comprehension_target_does_not_shadow_other_invariants() {
    let comprehension = Expr::new(ExprKind::ListComp {
        elt: Expr::binop("Mult", float_cast(Expr::name("k")), Expr::name("x")).into(),
        generators: vec![Comprehension { target: Expr::name("k"), iter: Expr::name("xs"), ifs: Vec::new() }],
    });
    let body = vec![
        Stmt::assign(Expr::name("ys"), comprehension),
        append("out", float_cast(Expr::name("m"))),
    ];
    let (document, result) = run(&LoopInvariantCastHoistPass, vec![static_loop(Expr::int(0), Expr::name("n"), 1, body)]);
    assert_eq!(result.change_count, 1);
    let Stmt::AnnAssign { value: Some(value), .. } = &document.body[0] else {
        panic!("expected hoisted declaration");
    };
    assert_eq!(value.to_string(), "static_cast<float64>(m)");
}

#[test]
fn opaque_nodes_disable_hoisting_and_hints() {
    let body = vec![append("out", float_cast(Expr::name("k"))), Stmt::expr(boxed("k"))];
    let (document, result) = run(&LoopInvariantCastHoistPass, vec![static_loop(Expr::int(0), Expr::name("n"), 1, body.clone())]);
    assert_eq!(result.change_count, 0);
    assert_eq!(document.body.len(), 1);

    let (document, result) = run(&SafeReserveHintPass, vec![static_loop(Expr::int(0), Expr::name("n"), 1, body)]);
    assert_eq!(result.change_count, 0);
    assert!(for_core(&document.body[0]).reserve_hints.is_empty());
}

#[test]
fn reserve_hint_disqualifiers() {
    let n = || Expr::name("n");
    let i = || Expr::name("i");
    let cases = [
        ("mixed owners", static_loop(Expr::int(0), n(), 1, vec![append("a", i()), append("b", i())])),
        ("two appends", static_loop(Expr::int(0), n(), 1, vec![append("out", i()), append("out", i())])),
        ("no append", static_loop(Expr::int(0), n(), 1, vec![Stmt::assign(Expr::name("x"), i())])),
        (
            "stop rebound",
            static_loop(Expr::int(0), n(), 1, vec![Stmt::assign(n(), i()), append("out", i())]),
        ),
        (
            "mode against step",
            static_loop_mode(n(), Expr::int(0), -1, "ascending", vec![append("out", i())]),
        ),
    ];
    for (label, stmt) in cases {
        let (document, result) = run(&SafeReserveHintPass, vec![stmt]);
        assert_eq!(result.change_count, 0, "{}", label);
        assert!(for_core(&document.body[0]).reserve_hints.is_empty(), "{}", label);
    }

    // same loop with a matching mode qualifies
    let (_, result) = run(
        &SafeReserveHintPass,
        vec![static_loop_mode(n(), Expr::int(0), -1, "descending", vec![append("out", i())])],
    );
    assert_eq!(result.change_count, 1);
}

#[test]
fn literal_cast_fold_keeps_source_text() {
    let folded = Expr::builtin_call("int", "static_cast", vec![Expr::int(42)]).with_type("int64").with_repr("int(42)");
    let widened = Expr::builtin_call("float", "static_cast", vec![Expr::int(42)]).with_type("float64");
    let (document, result) = run(
        &LiteralCastFoldPass,
        vec![Stmt::assign(Expr::name("a"), folded), Stmt::assign(Expr::name("b"), widened)],
    );
    assert_eq!(result.change_count, 1);

    let Stmt::Assign { value, .. } = &document.body[0] else {
        panic!("expected assignment");
    };
    assert_eq!(value.const_int(), Some(42));
    assert_eq!(value.repr.as_deref(), Some("int(42)"));
    let Stmt::Assign { value, .. } = &document.body[1] else {
        panic!("expected assignment");
    };
    assert!(value.is_builtin_runtime_call("static_cast"));
}

#[test]
fn cast_chain_reduction_inside_loop_bounds() {
    let stop = Expr::builtin_call("int", "static_cast", vec![Expr::name("n").with_type("int64")]).with_type("int");
    let (document, result) = run(&NumericCastChainReductionPass, vec![static_loop(Expr::int(0), stop, 1, vec![Stmt::Pass])]);
    assert_eq!(result.change_count, 1);
    let IterPlan::StaticRangeForPlan { stop, .. } = &for_core(&document.body[0]).iter_plan else {
        panic!("expected static plan");
    };
    assert_eq!(stop.name_id(), Some("n"));
}

#[test]
fn unread_loop_variable_is_elided() {
    let (document, result) = run(
        &UnusedLoopVarElisionPass,
        vec![static_loop(Expr::int(0), Expr::int(3), 1, vec![append("out", Expr::int(1))])],
    );
    assert_eq!(result.change_count, 1);
    assert_eq!(loop_var(&document.body[0]), "_");
}

#[test]
fn loop_variable_read_anywhere_in_scope_is_kept() {
    let read_in_body = vec![static_loop(Expr::int(0), Expr::int(3), 1, vec![append("out", Expr::name("i"))])];
    let read_after = vec![
        static_loop(Expr::int(0), Expr::int(3), 1, vec![Stmt::Pass]),
        Stmt::expr(Expr::call(Expr::name("print"), vec![Expr::name("i")])),
    ];
    let read_before = vec![Stmt::While {
        test: Expr::name("flag"),
        body: vec![
            Stmt::expr(Expr::call(Expr::name("print"), vec![Expr::name("i")])),
            static_loop(Expr::int(0), Expr::int(3), 1, vec![Stmt::Pass]),
        ],
        orelse: Vec::new(),
    }];
    let dynamic = vec![static_loop(
        Expr::int(0),
        Expr::int(3),
        1,
        vec![Stmt::expr(Expr::call(Expr::name("locals"), Vec::new()))],
    )];
    let closure = vec![Stmt::FunctionDef(FunctionDef::new(
        "f",
        &[],
        vec![
            static_loop(Expr::int(0), Expr::int(3), 1, vec![Stmt::Pass]),
            Stmt::FunctionDef(FunctionDef::new("g", &[], vec![Stmt::ret(Some(Expr::name("i")))])),
        ],
    ))];
    for body in [read_in_body, read_after, read_before, dynamic, closure] {
        let (document, result) = run(&UnusedLoopVarElisionPass, body);
        assert_eq!(result.change_count, 0, "{:?}", document.body);
    }
}

#[test]
fn function_scope_is_tallied_on_its_own() {
    let body = vec![
        Stmt::FunctionDef(FunctionDef::new(
            "f",
            &[],
            vec![static_loop(Expr::int(0), Expr::int(3), 1, vec![append("out", Expr::int(0))])],
        )),
        Stmt::expr(Expr::call(Expr::name("print"), vec![Expr::name("i")])),
    ];
    let (document, result) = run(&UnusedLoopVarElisionPass, body);
    assert_eq!(result.change_count, 1);
    let Stmt::FunctionDef(def) = &document.body[0] else {
        panic!("expected FunctionDef");
    };
    assert_eq!(loop_var(&def.body[0]), "_");
}

#[test]
fn invariant_leading_assignment_is_hoisted() {
    let body = vec![
        Stmt::assign(Expr::name("x"), Expr::binop("Mult", Expr::name("a"), Expr::int(2))),
        append("out", Expr::name("x")),
    ];
    let (document, result) = run(&LoopInvariantHoistLitePass, vec![static_loop(Expr::int(0), Expr::int(4), 1, body)]);
    assert_eq!(result.change_count, 1);
    assert_eq!(document.body.len(), 2);
    let Stmt::Assign { target, value } = &document.body[0] else {
        panic!("expected hoisted assignment");
    };
    assert_eq!(target.name_id(), Some("x"));
    assert_eq!(value.to_string(), "(a * 2)");
    assert_eq!(for_core(&document.body[1]).body.len(), 1);
}

#[test]
fn leading_assignment_stays_when_unsafe() {
    let assign = |target: &str, value: Expr| Stmt::assign(Expr::name(target), value);
    let cases = [
        ("empty range", Expr::int(0), vec![assign("x", Expr::name("a")), append("out", Expr::name("x"))]),
        (
            "reads itself",
            Expr::int(4),
            vec![assign("x", Expr::binop("Add", Expr::name("x"), Expr::int(1))), append("out", Expr::name("x"))],
        ),
        (
            "reads loop variable",
            Expr::int(4),
            vec![assign("x", Expr::binop("Add", Expr::name("i"), Expr::int(1))), append("out", Expr::name("x"))],
        ),
        (
            "operand rebound later",
            Expr::int(4),
            vec![assign("x", Expr::name("a")), assign("a", Expr::name("i"))],
        ),
        (
            "target rebound later",
            Expr::int(4),
            vec![assign("x", Expr::name("a")), assign("x", Expr::name("i"))],
        ),
        (
            "call value",
            Expr::int(4),
            vec![assign("x", Expr::call(Expr::name("f"), Vec::new())), append("out", Expr::name("x"))],
        ),
    ];
    for (label, stop, body) in cases {
        let (document, result) = run(&LoopInvariantHoistLitePass, vec![static_loop(Expr::int(0), stop, 1, body)]);
        assert_eq!(result.change_count, 0, "{}", label);
        assert_eq!(document.body.len(), 1, "{}", label);
    }
}

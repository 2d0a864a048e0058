use std::fs;

use assert_cmd::Command;

const CHAIN_DOC: &str = r#"{
  "kind": "Module",
  "east_stage": 3,
  "meta": { "module_id": "app" },
  "body": [
    {
      "kind": "FunctionDef",
      "name": "identity",
      "arg_order": ["x"],
      "body": [ { "kind": "Return", "value": { "kind": "Name", "id": "x" } } ]
    },
    {
      "kind": "FunctionDef",
      "name": "loop",
      "arg_order": ["a"],
      "body": [
        {
          "kind": "Return",
          "value": {
            "kind": "Call",
            "func": { "kind": "Name", "id": "loop" },
            "args": [ { "kind": "Name", "id": "a" } ]
          }
        }
      ]
    }
  ]
}"#;

fn east3opt() -> Command {
    Command::cargo_bin("east3opt").expect("east3opt binary")
}

#[test]
fn optimize_writes_summaries_and_trace() {
    let td = tempfile::tempdir().expect("tempdir");
    let input = td.path().join("app.east3.json");
    let output = td.path().join("out.json");
    let report = td.path().join("report.json");
    fs::write(&input, CHAIN_DOC).expect("write input");

    let assert = east3opt()
        .arg("optimize")
        .arg(&input)
        .arg("-O")
        .arg("1")
        .arg("--target")
        .arg("cpp")
        .arg("--trace")
        .arg("-o")
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("east3_optimizer_trace:"), "{}", stderr);
    assert!(stderr.contains("- NonEscapeInterproceduralPass enabled=true changed=true"), "{}", stderr);

    let optimized: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("read output")).expect("json");
    let summary = &optimized["meta"]["non_escape_summary"]["app::identity"];
    assert_eq!(summary["return_from_args"], serde_json::json!([true]));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("read report")).expect("json");
    assert_eq!(report["target_lang"], "cpp");
    assert_eq!(report["trace"].as_array().map(Vec::len), Some(8));
    assert!(stderr.contains("- LoopInvariantHoistLitePass enabled=false"), "{}", stderr);
}

#[test]
fn table_trace_and_pass_overrides() {
    let td = tempfile::tempdir().expect("tempdir");
    let input = td.path().join("app.east3.json");
    fs::write(&input, CHAIN_DOC).expect("write input");

    let assert = east3opt()
        .arg("optimize")
        .arg(&input)
        .arg("--opt-pass")
        .arg("-NonEscapeInterproceduralPass")
        .arg("--trace")
        .arg("--trace-format")
        .arg("table")
        .assert()
        .success();
    let output = assert.get_output();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(stderr.contains("NonEscapeInterproceduralPass"), "{}", stderr);
    assert!(stderr.contains("total"), "{}", stderr);

    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).expect("document on stdout");
    assert!(stdout["meta"].get("non_escape_summary").is_none());
}

#[test]
fn invalid_level_fails() {
    let td = tempfile::tempdir().expect("tempdir");
    let input = td.path().join("app.east3.json");
    fs::write(&input, CHAIN_DOC).expect("write input");

    let assert = east3opt().arg("optimize").arg(&input).arg("-O").arg("7").assert().failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("invalid opt level: 7"), "{}", stderr);
}

#[test]
fn non_module_root_is_rejected() {
    let td = tempfile::tempdir().expect("tempdir");
    let input = td.path().join("bad.json");
    fs::write(&input, r#"{"kind": "Expr"}"#).expect("write input");
    east3opt().arg("optimize").arg(&input).assert().failure();
}

#[test]
fn sccs_marks_recursive_components() {
    let td = tempfile::tempdir().expect("tempdir");
    let input = td.path().join("app.east3.json");
    fs::write(&input, CHAIN_DOC).expect("write input");

    let assert = east3opt().arg("sccs").arg(&input).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["app::identity", "recursive app::loop"]);
}

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn duoquery_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_duoquery"))
}

/// Run the binary in an empty directory so no `duoquery.json` is picked up.
fn run(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().expect("tempdir");
    Command::new(duoquery_bin())
        .args(args)
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("DUOQUERY_DOC_URL")
        .output()
        .expect("run duoquery")
}

#[test]
fn tasks_json_lists_the_catalog() {
    let out = run(&["--json", "tasks"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let tasks: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json output");
    let slugs: Vec<&str> = tasks
        .as_array()
        .expect("array of tasks")
        .iter()
        .filter_map(|t| t["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["sales-per-franchise", "product-sales-per-franchise"]);
}

#[test]
fn malformed_pipeline_fails_before_connecting() {
    let out = run(&["doc", "run", "--kind", "aggregate", "--query", r#"{"$match": {}}"#]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid query shape"));
}

#[test]
fn graph_params_must_be_a_mapping() {
    let out = run(&["graph", "run", "RETURN 1", "--params", "[1, 2]"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid parameters"));
}

#[test]
fn unknown_task_is_an_error() {
    let out = run(&["compare", "no-such-task"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown task"));
}

#[test]
fn broken_config_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write config");

    let out = run(&["--config", path.to_str().expect("utf-8 path"), "tasks"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid config"));
}

#[test]
fn document_queries_need_an_endpoint() {
    let out = run(&["doc", "run", "--query", r#"{"id_cafe": 1}"#]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("DUOQUERY_DOC_URL"));
}

//! Integration tests for `todo batch`.
//!
//! A batch is a JSON array of intents run as one session. These tests check
//! that the whole batch commits or nothing does, that placeholders resolve
//! across intents, and that `--dry-run` never writes.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::json;

fn write_batch(env: &TestEnv, name: &str, intents: serde_json::Value) -> std::path::PathBuf {
    let path = env.data_path().join(name);
    std::fs::write(&path, intents.to_string()).unwrap();
    path
}

#[test]
fn test_batch_commits_with_placeholders() {
    let env = TestEnv::init();
    let path = write_batch(
        &env,
        "plan.json",
        json!([
            {"op": "create_group", "name": "home"},
            {"op": "create_task", "title": "Buy paint", "assignee_groups": ["pending:1"]},
            {"op": "create_task", "title": "Paint fence", "depends_on": ["pending:2"]},
            {"op": "complete_task", "task": "pending:2"}
        ]),
    );

    let output = env
        .todo_as("alice")
        .arg("batch")
        .arg(&path)
        .assert()
        .success();
    let outcome: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(outcome["status"], "committed");
    assert_eq!(outcome["created_ids"].as_array().unwrap().len(), 3);

    let paint = outcome["placeholders"]["3"].as_str().unwrap();
    let shown = env.json("alice", &["task", "show", paint]);
    assert_eq!(shown["prerequisites"][0], outcome["placeholders"]["2"]);
    assert!(shown.get("blocked_by").is_none());
}

#[test]
fn test_batch_aborts_whole_batch_on_unmet_prerequisite() {
    let env = TestEnv::init();
    let path = write_batch(
        &env,
        "plan.json",
        json!([
            {"op": "create_task", "title": "A"},
            {"op": "create_task", "title": "B", "depends_on": ["pending:1"]},
            {"op": "complete_task", "task": "pending:2"}
        ]),
    );

    env.todo_as("alice")
        .arg("batch")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"kind\":\"dependency_not_met\""))
        .stdout(predicate::str::contains("\"failing_intent_index\":2"));

    assert_eq!(env.json("alice", &["task", "list"])["count"], 0);
}

#[test]
fn test_batch_from_stdin() {
    let env = TestEnv::init();
    let intents = json!([
        {"op": "create_task", "title": "From stdin", "urgency": "critical"},
        {"op": "update_task", "task": "current", "description": "piped in"}
    ]);

    env.todo_as("alice")
        .arg("batch")
        .write_stdin(intents.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"committed\""));

    let list = env.json("alice", &["task", "list"]);
    assert_eq!(list["tasks"][0]["urgency"], "critical");
    assert_eq!(list["tasks"][0]["description"], "piped in");
}

#[test]
fn test_batch_rejects_unknown_op() {
    let env = TestEnv::init();

    env.todo_as("alice")
        .arg("batch")
        .write_stdin(r#"[{"op": "launch_rocket"}]"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"code\":\"json\""));
}

#[test]
fn test_batch_oversized_is_rejected_before_staging() {
    let env = TestEnv::init();
    env.write_config("max-intents 2\n");
    let intents = json!([
        {"op": "create_task", "title": "1"},
        {"op": "create_task", "title": "2"},
        {"op": "create_task", "title": "3"}
    ]);

    env.todo_as("alice")
        .arg("batch")
        .write_stdin(intents.to_string())
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"kind\":\"invalid_input\""))
        .stdout(predicate::str::contains("\"failing_intent_index\":null"));

    assert_eq!(env.json("alice", &["task", "list"])["count"], 0);
}

#[test]
fn test_batch_dry_run_writes_nothing() {
    let env = TestEnv::init();
    let intents = json!([
        {"op": "create_task", "title": "A"},
        {"op": "create_task", "title": "B", "depends_on": ["pending:1"]}
    ]);

    let output = env
        .todo_as("alice")
        .args(["batch", "--dry-run"])
        .write_stdin(intents.to_string())
        .assert()
        .success();
    let result: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(result["operations"].as_array().unwrap().len(), 2);
    assert_eq!(result["operations"][1]["placeholder"], 2);
    assert_eq!(result["outcome"]["kind"], "discarded");

    assert_eq!(env.json("alice", &["task", "list"])["count"], 0);
}

#[test]
fn test_batch_dry_run_reports_rejection() {
    let env = TestEnv::init();
    let intents = json!([
        {"op": "create_task", "title": "A"},
        {"op": "set_dependency", "task": "pending:1", "prerequisite": "pending:1"}
    ]);

    env.todo_as("alice")
        .args(["-H", "batch", "--dry-run"])
        .write_stdin(intents.to_string())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Batch would abort"))
        .stdout(predicate::str::contains("[cycle]"));
}

//! CLI integration tests for rx-replay

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to write an action log and an empty config into a temp dir
fn setup(log: &str) -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("actions.jsonl");
    fs::write(&log_path, log).unwrap();
    fs::write(temp_dir.path().join("config.toml"), "").unwrap();
    (temp_dir, log_path.to_string_lossy().to_string())
}

fn replay(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rx-replay").unwrap();
    cmd.env("RX_CONFIG", temp_dir.path().join("config.toml"))
        .env_remove("RX_LOG_FORMAT")
        .env_remove("RX_LOG_LEVEL");
    cmd
}

#[test]
fn test_watch_reports_only_changes() {
    let (dir, log) = setup(
        r#"# filters first
{"type": "set", "path": "filters.color", "value": "red"}

{"type": "set", "path": "title", "value": "plot"}
{"type": "set", "path": "filters.color", "value": "blue"}
"#,
    );

    replay(&dir)
        .args(["--watch", "filters.color", &log])
        .assert()
        .success()
        .stdout(predicate::str::contains("render filters.color seq=- value=null"))
        .stdout(predicate::str::contains("render filters.color seq=1 value=\"red\""))
        .stdout(predicate::str::contains("render filters.color seq=3 value=\"blue\""))
        .stdout(predicate::str::contains("seq=2").not());
}

#[test]
fn test_watch_skips_numerically_equal_value() {
    let (dir, log) = setup(
        r#"{"type": "set", "path": "a", "value": 1}
{"type": "set", "path": "a", "value": 1.0}
"#,
    );

    replay(&dir)
        .args(["--watch", "a", &log])
        .assert()
        .success()
        .stdout(predicate::str::contains("render a seq=- value=null"))
        .stdout(predicate::str::contains("render a seq=1 value=1"))
        .stdout(predicate::str::contains("seq=2").not());
}

#[test]
fn test_json_output_has_final_state() {
    let (dir, log) = setup(
        r#"{"type": "merge", "value": {"a": {"b": 1}}}
{"type": "push", "path": "a.list", "value": "x"}
{"type": "delete", "path": "start"}
"#,
    );

    let output = replay(&dir)
        .args(["--state", r#"{"start": true}"#, "--format", "json", "--watch", "a", &log])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["state"], serde_json::json!({ "a": { "b": 1, "list": ["x"] } }));
    assert_eq!(report["sequence"], 3);
    assert_eq!(report["renders"].as_array().unwrap().len(), 3);
}

#[test]
fn test_jsonl_output_one_record_per_line() {
    let (dir, log) = setup("{\"type\": \"set\", \"path\": \"n\", \"value\": 1}\n");

    let output = replay(&dir)
        .args(["--format", "jsonl", "--watch", "n", &log])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["event"], "render");
    assert_eq!(lines[1]["value"], 1);
}

#[test]
fn test_save_every_bypasses_watchers() {
    let (dir, log) = setup(
        r#"{"type": "set", "path": "n", "value": 1}
{"type": "set", "path": "n", "value": 2}
{"type": "set", "path": "n", "value": 3}
"#,
    );

    replay(&dir)
        .args(["--save-every", "2", "--watch", "n", &log])
        .assert()
        .success()
        .stdout(predicate::str::contains("save line=2 seq=2 recovered=1"))
        .stdout(predicate::str::contains("value=2").not())
        .stdout(predicate::str::contains("render n seq=3 value=3"));
}

#[test]
fn test_stdin_input() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "").unwrap();

    replay(&dir)
        .args(["--watch", "k", "-"])
        .write_stdin("{\"type\": \"set\", \"path\": \"k\", \"value\": \"v\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("state {\"k\":\"v\"}"));
}

#[test]
fn test_failed_action_exits_1() {
    let (dir, log) = setup(
        r#"{"type": "set", "path": "n", "value": 1}
{"type": "set", "path": "n.deeper", "value": 2}
"#,
    );

    replay(&dir)
        .arg(&log)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error line=2"))
        .stderr(predicate::str::contains("1 action(s) failed"));
}

#[test]
fn test_unknown_action_type_exits_2() {
    let (dir, log) = setup("{\"type\": \"explode\"}\n");

    replay(&dir)
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 1: Undeclared action type 'explode'"));
}

#[test]
fn test_malformed_json_exits_2() {
    let (dir, log) = setup("{\"type\": \n");

    replay(&dir)
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 1: invalid JSON"));
}

#[test]
fn test_non_object_state_rejected() {
    let (dir, log) = setup("");

    replay(&dir)
        .args(["--state", "[1, 2]", &log])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid --state"));
}

#[test]
fn test_bad_config_exits_2() {
    let (dir, log) = setup("");
    fs::write(dir.path().join("config.toml"), "[store\n").unwrap();

    replay(&dir)
        .arg(&log)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_state_from_file() {
    let (dir, log) = setup("{\"type\": \"reset\"}\n");
    let state_path = dir.path().join("initial.json");
    fs::write(&state_path, r#"{"base": 1}"#).unwrap();

    replay(&dir)
        .args(["--state", &format!("@{}", state_path.display()), &log])
        .assert()
        .success()
        .stdout(predicate::str::contains("state {\"base\":1}"));
}

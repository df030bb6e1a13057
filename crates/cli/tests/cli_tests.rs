// Integration tests for the cgrade binary: exit codes and the --json contract.
//
// Run with: cargo test -p calcgrade-cli --test cli_tests -- --nocapture

use std::path::PathBuf;
use std::process::{Command, Output};

fn cgrade() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cgrade"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("CALCGRADE_CONFIG");
    cmd
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../correction/tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn grade(extra: &[&str]) -> Output {
    let mut args = vec![
        "grade".to_string(),
        fixture("instruction.json"),
        fixture("solution.json"),
        fixture("submission.json"),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    cgrade().args(&args).output().expect("cgrade grade")
}

fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

// ===========================================================================
// cgrade grade
// ===========================================================================

#[test]
fn grade_passing_submission_exits_zero() {
    let output = grade(&["--seed", "1"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "passed");
}

#[test]
fn grade_json_is_single_report() {
    let output = grade(&["--seed", "2", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let val: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(val["verdict"]["passed"], true);
    assert_eq!(val["rules_run"].as_array().unwrap().len(), 6);
    assert!(val.get("failed_rule").is_none());
}

#[test]
fn grade_failing_submission_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let text = std::fs::read_to_string(fixture("submission.json")).unwrap();
    let tampered = write_temp(&dir, "submission.json", &text.replace("\"keywords\": \"#K7Q2\"", "\"keywords\": \"#ZZZZ\""));

    let output = cgrade()
        .args(["grade", &fixture("instruction.json"), &fixture("solution.json"), &tampered, "--json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["verdict"]["passed"], false);
    assert_eq!(val["failed_rule"], "authenticity");
    assert_eq!(val["rules_run"], serde_json::json!(["authenticity"]));
}

#[test]
fn grade_with_config_restricting_rules() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_temp(&dir, "grading.toml", "rules = [\"authenticity\", \"formatting\", \"print_setup\"]\n");

    let output = grade(&["--config", &config, "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(val["rules_run"], serde_json::json!(["authenticity", "formatting", "print_setup"]));
}

#[test]
fn grade_config_without_authenticity_first_exits_four() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_temp(&dir, "grading.toml", "rules = [\"values\", \"authenticity\"]\n");

    let output = grade(&["--config", &config]);
    assert_eq!(output.status.code(), Some(4));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("must start with 'authenticity'"));
}

#[test]
fn grade_missing_document_is_usage_error() {
    let output = cgrade()
        .args(["grade", "nope.json", &fixture("solution.json"), &fixture("submission.json")])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("file not found"));
}

#[test]
fn grade_malformed_document_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write_temp(&dir, "broken.json", "{ \"sheets\": [");

    let output = cgrade()
        .args(["grade", &fixture("instruction.json"), &fixture("solution.json"), &broken])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn grade_bad_config_exits_four() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_temp(&dir, "grading.toml", "[tolerance]\nrelative = 2.0\n");

    let output = grade(&["--config", &config]);
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("hint:"));
}

// ===========================================================================
// cgrade roles
// ===========================================================================

#[test]
fn roles_lists_coloured_cells() {
    let output = cgrade().args(["roles", &fixture("solution.json")]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.contains(&"Orders!B1\tselection"));
    assert!(lines.contains(&"Orders!B2\tinput"));
    assert!(lines.contains(&"Orders!B5\tcalculation_helper"));
    assert!(lines.iter().all(|l| !l.ends_with("none")));
}

#[test]
fn roles_json() {
    let output = cgrade().args(["roles", &fixture("solution.json"), "--json"]).output().unwrap();
    let val: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = val.as_array().unwrap();
    assert_eq!(entries.len(), 7);
    assert_eq!(entries[0]["cell"], "Orders!B1");
    assert_eq!(entries[0]["role"], "selection");
}

// ===========================================================================
// cgrade check-config
// ===========================================================================

#[test]
fn check_config_prints_chain() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_temp(&dir, "grading.toml", "rules = [\"authenticity\", \"values\"]\n");

    let output = cgrade().args(["check-config", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("authenticity -> values"));
}

#[test]
fn check_config_unknown_rule() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_temp(&dir, "grading.toml", "rules = [\"authenticity\", \"spelling\"]\n");

    let output = cgrade().args(["check-config", &config]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown rule: spelling"));
}

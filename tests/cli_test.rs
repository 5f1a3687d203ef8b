//! Binary tests for `review-context`.

#![allow(deprecated)] // cargo_bin is deprecated in newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

const DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 pub fn add(a: i32, b: i32) -> i32 {
-    a + b
+    let sum = a + b;
+    sum
 }
";

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/lib.rs"),
        "pub fn add(a: i32, b: i32) -> i32 {\n    let sum = a + b;\n    sum\n}\n",
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "# Calc\n").unwrap();
    fs::write(dir.path().join("changes.diff"), DIFF).unwrap();
    dir
}

fn review_context(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("review-context").unwrap();
    cmd.env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUST_LOG")
        .arg("--workspace")
        .arg(dir.path())
        .arg("--diff")
        .arg(dir.path().join("changes.diff"));
    cmd
}

#[test]
fn test_binary_help() {
    Command::cargo_bin("review-context")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--diff"))
        .stdout(predicate::str::contains("--token-budget"));
}

#[test]
fn test_binary_version() {
    Command::cargo_bin("review-context")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("review-context"));
}

#[test]
fn test_prints_bundle_as_json() {
    let dir = workspace();
    let output = review_context(&dir)
        .arg("--repository")
        .arg("acme/calc")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let bundle: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(bundle["files"][0]["filename"], "src/lib.rs");
    assert_eq!(bundle["metrics"]["files_changed"], 1);
    assert_eq!(bundle["pull_request"]["title"], "Local changes");
    assert_eq!(bundle["repository_docs"]["readme"], "# Calc\n");
}

#[test]
fn test_metrics_go_to_stderr() {
    let dir = workspace();
    review_context(&dir)
        .arg("--metrics")
        .assert()
        .success()
        .stderr(predicate::str::contains("review_context_builds_total 1"))
        .stdout(predicate::str::contains("review_context_builds_total").not());
}

#[test]
fn test_pull_request_metadata_file() {
    let dir = workspace();
    fs::write(
        dir.path().join("pr.json"),
        r#"{"number": 42, "title": "Refactor add", "head_sha": "abc123"}"#,
    )
    .unwrap();

    let output = review_context(&dir)
        .arg("--pull-request")
        .arg(dir.path().join("pr.json"))
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let bundle: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(bundle["pull_request"]["number"], 42);
    assert_eq!(bundle["pull_request"]["title"], "Refactor add");
}

#[test]
fn test_small_token_budget_is_honored() {
    let dir = workspace();
    let mut diff = String::from(
        "diff --git a/src/big.rs b/src/big.rs\n--- /dev/null\n+++ b/src/big.rs\n@@ -0,0 +1,100 @@\n",
    );
    for i in 0..100 {
        diff.push_str(&format!("+let value_{:03} = compute(\"padding-padding\");\n", i));
    }
    fs::write(dir.path().join("changes.diff"), diff).unwrap();

    // About 1100 tokens of patch: whole under the default budget,
    // truncated under a 1000-token one
    let whole = review_context(&dir).output().unwrap();
    assert!(whole.status.success());
    assert!(!String::from_utf8_lossy(&whole.stdout).contains("truncated"));

    review_context(&dir)
        .arg("--token-budget")
        .arg("1000")
        .assert()
        .success()
        .stdout(predicate::str::contains("truncated"));
}

#[test]
fn test_missing_diff_fails() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("review-context")
        .unwrap()
        .arg("--workspace")
        .arg(dir.path())
        .arg("--diff")
        .arg(dir.path().join("absent.diff"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read diff"));
}

//! Runs the `ripple` binary against a throwaway project.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

fn ripple(project: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ripple"))
        .arg("--config")
        .arg(project)
        .arg("--color")
        .arg("never")
        .args(args)
        .output()
        .expect("failed to run ripple")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_summaries(project: &Path, f_signature: &str) {
    let summaries = json!({
        "units": {
            "src/A.kt": {
                "declarations": [
                    { "kind": "function", "scope": "pkg", "name": "f", "shape": "()", "signature": f_signature }
                ],
                "output": format!("A.class {f_signature}")
            },
            "src/B.kt": {
                "lookups": [ { "scope": "pkg", "name": "f" } ],
                "output": "B.class"
            },
            "src/C.kt": {
                "lookups": [ { "scope": "pkg", "name": "g" } ],
                "output": "C.class"
            }
        }
    });
    std::fs::write(
        project.join("summaries.json"),
        serde_json::to_string_pretty(&summaries).unwrap(),
    )
    .unwrap();
}

fn build_json(project: &Path) -> Value {
    let summaries = project.join("summaries.json");
    let output = ripple(
        project,
        &["build", "--summaries", summaries.to_str().unwrap(), "--format", "json"],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_str(&stdout(&output)).unwrap()
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ripple.toml"),
        "[project]\nname = \"demo\"\n\n[compiler]\nversion = \"1.9.0\"\n",
    )
    .unwrap();
    write_summaries(dir.path(), "(): Int");
    dir
}

#[test]
fn detected_change_propagates_through_lookups() {
    let dir = project();

    let first = build_json(dir.path());
    assert_eq!(first["outcome"], "full rebuild");
    assert_eq!(first["generation"], 1);
    assert_eq!(first["rebuild_cause"], "no build history");

    write_summaries(dir.path(), "(): String");
    let second = build_json(dir.path());
    assert_eq!(second["outcome"], "fixpoint");
    assert_eq!(second["rounds"], json!([["src/A.kt"], ["src/B.kt"]]));
    assert_eq!(second["generation"], 2);

    let unchanged = build_json(dir.path());
    assert_eq!(unchanged["rounds"], json!([]));
}

#[test]
fn status_dependents_and_invalidate() {
    let dir = project();
    build_json(dir.path());

    let status = stdout(&ripple(dir.path(), &["status"]));
    assert!(status.contains("generation:    1"));
    assert!(status.contains("units:         3"));

    let dependents = stdout(&ripple(dir.path(), &["dependents", "pkg", "f"]));
    assert_eq!(dependents.lines().collect::<Vec<_>>(), vec!["src/B.kt"]);

    assert!(ripple(dir.path(), &["invalidate"]).status.success());
    let status = stdout(&ripple(dir.path(), &["status"]));
    assert!(status.starts_with("no build history"));
    assert!(!ripple(dir.path(), &["dependents", "pkg", "f"]).status.success());
}

#[test]
fn failing_unit_sets_exit_code() {
    let dir = project();
    build_json(dir.path());

    let summaries = json!({
        "units": {
            "src/A.kt": { "failure": ["syntax error"] },
            "src/B.kt": { "lookups": [ { "scope": "pkg", "name": "f" } ], "output": "B.class" },
            "src/C.kt": { "lookups": [ { "scope": "pkg", "name": "g" } ], "output": "C.class" }
        }
    });
    let path = dir.path().join("broken.json");
    std::fs::write(&path, summaries.to_string()).unwrap();

    let output = ripple(
        dir.path(),
        &[
            "build",
            "--summaries",
            path.to_str().unwrap(),
            "--modified",
            "src/A.kt",
            "--format",
            "json",
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    let report: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["outcome"], "failed");
    assert_eq!(report["failed"], json!(["src/A.kt"]));
}

#[test]
fn missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = ripple(dir.path(), &["status"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error:"));
}

use std::path::Path;
use std::process::{Command, Output};

use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn run_tasklane(root: &Path, args: &[&str]) -> Output {
    let binary = assert_cmd::cargo::cargo_bin!("tasklane");
    let mut cmd = Command::new(binary);
    cmd.current_dir(root);
    cmd.env_remove("TASKLANE_TOKEN");
    cmd.env_remove("RUST_LOG");
    cmd.arg("--format").arg("json");
    cmd.args(args);
    cmd.output().expect("tasklane command executes")
}

fn run_ok(root: &Path, args: &[&str]) -> Value {
    let output = run_tasklane(root, args);
    assert!(
        output.status.success(),
        "tasklane {:?} failed:\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json stdout")
}

fn run_err(root: &Path, args: &[&str]) -> Value {
    let output = run_tasklane(root, args);
    assert!(!output.status.success(), "tasklane {args:?} unexpectedly succeeded");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with('{'))
        .expect("json error on stderr");
    serde_json::from_str(line).expect("valid json error")
}

fn init_with_fast_hashing(root: &Path) {
    run_ok(root, &["init"]);
    std::fs::write(
        root.join(".tasklane").join("config.toml"),
        "[auth]\nhash_iterations = 1000\n",
    )
    .unwrap();
}

#[test]
fn commands_require_a_workspace() {
    let dir = tempdir().unwrap();
    let err = run_err(dir.path(), &["admin", "list-users"]);
    assert_eq!(err["error"], "not_initialized");
}

#[test]
fn init_twice_is_refused() {
    let dir = tempdir().unwrap();
    run_ok(dir.path(), &["init"]);
    let err = run_err(dir.path(), &["init"]);
    assert_eq!(err["error"], "already_initialized");
}

#[test]
fn operator_account_then_rpc_calls() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    init_with_fast_hashing(root);

    let admin = run_ok(
        root,
        &[
            "admin",
            "create-user",
            "--email",
            "Ops@Example.com",
            "--name",
            "Ops",
            "--password",
            "operator pw",
            "--admin",
        ],
    );
    assert_eq!(admin["email"], "ops@example.com");
    assert_eq!(admin["role"], "admin");

    let login = run_ok(
        root,
        &[
            "call",
            "auth.login",
            r#"{"email":"ops@example.com","password":"operator pw"}"#,
        ],
    );
    let token = login["token"].as_str().unwrap().to_string();

    let project = run_ok(
        root,
        &["call", "project.create", r#"{"name":"Infra"}"#, "--token", &token],
    );
    assert_eq!(project["name"], "Infra");

    let listed = run_ok(root, &["call", "project.list", "--token", &token]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let err = run_err(root, &["call", "project.list"]);
    assert_eq!(err["error"], "unauthorized");

    let err = run_err(root, &["call", "no.such.thing", "--token", &token]);
    assert_eq!(err["error"], "unknown_procedure");
}

#[test]
fn token_comes_from_environment() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    init_with_fast_hashing(root);

    run_ok(
        root,
        &[
            "call",
            "auth.register",
            r#"{"email":"ada@example.com","name":"Ada","password":"correct horse"}"#,
        ],
    );
    let login = run_ok(
        root,
        &[
            "call",
            "auth.login",
            r#"{"email":"ada@example.com","password":"correct horse"}"#,
        ],
    );
    let token = login["token"].as_str().unwrap();

    let binary = assert_cmd::cargo::cargo_bin!("tasklane");
    let output = Command::new(binary)
        .current_dir(root)
        .env("TASKLANE_TOKEN", token)
        .args(["call", "auth.me"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let me: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(me["email"], "ada@example.com");
}

#[test]
fn admin_commands_manage_accounts() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    init_with_fast_hashing(root);

    run_ok(
        root,
        &[
            "admin", "create-user", "--email", "a@example.com", "--name", "A", "--password",
            "password one", "--admin",
        ],
    );
    run_ok(
        root,
        &[
            "admin", "create-user", "--email", "b@example.com", "--name", "B", "--password",
            "password two",
        ],
    );

    let err = run_err(root, &["admin", "set-role", "a@example.com", "member"]);
    assert_eq!(err["error"], "last_admin");

    let promoted = run_ok(root, &["admin", "set-role", "b@example.com", "admin"]);
    assert_eq!(promoted["role"], "admin");

    run_ok(
        root,
        &["admin", "reset-password", "b@example.com", "--password", "password three"],
    );
    run_ok(
        root,
        &[
            "call",
            "auth.login",
            r#"{"email":"b@example.com","password":"password three"}"#,
        ],
    );

    let users = run_ok(root, &["admin", "list-users"]);
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[test]
fn procedures_listing_needs_no_workspace() {
    let dir = tempdir().unwrap();
    let procedures = run_ok(dir.path(), &["procedures"]);
    let names: Vec<&str> = procedures
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"auth.login"));
    assert!(names.contains(&"time.summary"));

    let binary = assert_cmd::cargo::cargo_bin!("tasklane");
    let output = Command::new(binary)
        .current_dir(dir.path())
        .args(["--pretty", "procedures"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(predicate::str::contains("task.set_status").eval(stdout.as_str()));
}

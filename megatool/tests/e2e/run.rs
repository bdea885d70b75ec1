//! E2E tests: `megatool run` against stand-in servers on PATH

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Write an executable `megatool-<name>` shell script into `bin`
fn fake_server(bin: &Path, name: &str, body: &str) -> PathBuf {
    std::fs::create_dir_all(bin).unwrap();
    let path = bin.join(format!("megatool-{}", name));
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn run(home: &Path, args: &[&str]) -> Output {
    let bin = home.join("bin");
    let path = match std::env::var_os("PATH") {
        Some(existing) => {
            let mut dirs = vec![bin];
            dirs.extend(std::env::split_paths(&existing));
            std::env::join_paths(dirs).unwrap()
        }
        None => bin.into_os_string(),
    };

    Command::new(env!("CARGO_BIN_EXE_megatool"))
        .args(args)
        .env("PATH", path)
        .env("MEGATOOL_LOG_DIR", home.join("logs"))
        .env("MEGATOOL_CONFIG_DIR", home.join("config"))
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run megatool")
}

fn registry_json(home: &Path) -> serde_json::Value {
    let content =
        std::fs::read_to_string(home.join("config").join("running-servers.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_run_passes_output_through_and_logs_it() {
    let home = TempDir::new().unwrap();
    fake_server(&home.path().join("bin"), "example", "echo Hi\necho oops >&2");

    let output = run(home.path(), &["run", "example"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hi\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("oops"));

    let registry = registry_json(home.path());
    let servers = registry["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["name"], "example");
    let pid = servers[0]["pid"].as_u64().unwrap();

    let log = home
        .path()
        .join("logs")
        .join("example")
        .join(format!("server_{}.log", pid));
    let content = std::fs::read_to_string(log).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l["message"] == "Hi"));
    assert!(lines.iter().any(|l| l["message"] == "oops"));

    // The child has exited, so the next ps prunes it
    let output = run(home.path(), &["ps", "--format", "json"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[]");
    assert!(registry_json(home.path())["servers"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_run_propagates_exit_code() {
    let home = TempDir::new().unwrap();
    fake_server(&home.path().join("bin"), "failing", "exit 3");

    let output = run(home.path(), &["run", "failing"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stderr.is_empty());
}

#[test]
fn test_run_forwards_args_and_sse_env() {
    let home = TempDir::new().unwrap();
    fake_server(
        &home.path().join("bin"),
        "env",
        "echo \"$MCP_SERVER_MODE $MCP_SERVER_PORT $MCP_SERVER_BASE_URL $*\"",
    );

    let output = run(
        home.path(),
        &["run", "env", "--sse", "--port", "9123", "--", "--flag", "value"],
    );
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "sse 9123 http://localhost:9123 --flag value\n"
    );
}

#[test]
fn test_run_help_mode_skips_registry() {
    let home = TempDir::new().unwrap();
    fake_server(&home.path().join("bin"), "helpful", "echo \"help=$MCP_HELP_MODE\"");

    let output = run(home.path(), &["run", "helpful", "--help"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "help=true\n");
    assert!(!home.path().join("config").join("running-servers.json").exists());
}

#[test]
fn test_run_unknown_server_suggests_ls() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["run", "does-not-exist"]);
    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("megatool-does-not-exist"));
    assert!(err.contains("megatool ls"));
}

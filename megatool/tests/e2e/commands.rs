//! E2E tests: operator commands with an empty registry and log root

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// `megatool` with its state directories inside `home`
fn megatool(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_megatool"));
    cmd.env("MEGATOOL_LOG_DIR", home.join("logs"))
        .env("MEGATOOL_CONFIG_DIR", home.join("config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    megatool(home)
        .args(args)
        .output()
        .expect("Failed to run megatool")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["run", "ls", "ps", "stop", "logs", "cleanup", "install"] {
        assert!(text.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_unknown_command_exits_one() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["frobnicate"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("Error: "), "{}", err);
    assert!(err.contains("frobnicate"));

    let output = run(home.path(), &["ps", "--format", "yaml"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error: "));
}

#[test]
fn test_ps_with_no_servers() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["ps"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No servers running."));

    let output = run(home.path(), &["ps", "--format", "json"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "[]");
}

#[test]
fn test_ps_rejects_malformed_registry() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir_all(home.path().join("config")).unwrap();
    std::fs::write(
        home.path().join("config").join("running-servers.json"),
        "{ nope",
    )
    .unwrap();

    let output = run(home.path(), &["ps"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error:"));
}

#[test]
fn test_stop_unknown_server() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["stop", "calculator"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Error: No running server 'calculator' found"));
    assert!(err.contains("megatool ps"));
}

#[test]
fn test_run_without_server() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["run"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Available servers:"));
    assert!(err.contains("Error: No server specified"));
}

#[test]
fn test_logs_and_cleanup_on_empty_root() {
    let home = TempDir::new().unwrap();

    let output = run(home.path(), &["logs"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No logs found."));

    let output = run(home.path(), &["cleanup", "--dry-run"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No log files to clean up."));
}

#[test]
fn test_install_rejects_unknown_client() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["install", "--client", "notepad", "calculator"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unsupported client 'notepad'"));
}

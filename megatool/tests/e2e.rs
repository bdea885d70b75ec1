//! E2E tests for the megatool binary
//!
//! Every test points `MEGATOOL_LOG_DIR` and `MEGATOOL_CONFIG_DIR` at a temp
//! directory so nothing touches the real registry or logs.
//!
//! Test structure:
//! - commands: operator commands against an empty environment
//! - run: launching stand-in server scripts found on PATH

#[path = "e2e/commands.rs"]
mod commands;

#[path = "e2e/run.rs"]
mod run;

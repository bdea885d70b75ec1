//! Supervisor and operator CLI for the megatool family of MCP servers
//!
//! `megatool run <server>` launches `megatool-<server>` with its output
//! copied to the terminal and to a rotating log file, and records the
//! process in a registry shared by `ps`, `stop`, `logs`, and `cleanup`.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod installer;
pub mod locator;
pub mod logs;
pub mod output;
pub mod process;
pub mod registry;
pub mod supervisor;

pub use error::{MegatoolError, Result};

//! Arithmetic tools over MCP
//!
//! A small server that follows the `megatool-<name>` convention. It is also
//! usable in-process through [`EmbeddableMcp`]:
//!
//! ```rust,ignore
//! use calculator::{CalculatorServer, EmbeddableMcp};
//!
//! let server = CalculatorServer::new();
//! let result = server.call_tool("add", serde_json::json!({"a": 1, "b": 2})).await?;
//! ```

pub mod server;

pub use server::{BinaryOpParams, CalculatorServer, CalculatorSettings};

pub use mcp_common::{EmbeddableError, EmbeddableMcp, EmbeddableResult};

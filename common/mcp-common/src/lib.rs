//! MCP Common - shared plumbing for megatool tool servers
//!
//! Every `megatool-<name>` server links this crate for:
//!
//! - **Startup**: [`serve_server!`] initialises tracing and serves over stdio,
//!   or over SSE when the supervisor sets `MCP_SERVER_MODE=sse`
//! - **Logging**: JSON lines on stderr, which `megatool run` captures into
//!   the server's log file
//! - **Results and errors**: helpers that turn data and failures into
//!   protocol responses
//! - **Descriptors**: a flat view of each tool's parameters
//! - **Config**: the per-server `config.json` file
//!
//! ```rust,ignore
//! mod server;
//! use server::CalculatorServer;
//!
//! mcp_common::serve_server!(CalculatorServer, "calculator");
//! ```

pub mod config;
pub mod descriptor;
pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;
pub mod sse;
pub mod transport;

pub use config::ServerConfigFile;
pub use descriptor::{DescriptorError, ParamKind, ParameterSpec, ToolDescriptor};
pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{internal_error, invalid_params, IntoMcpError, McpResult, ResultExt};
pub use init::init_tracing;
pub use result::json_success;
pub use transport::{serve, TransportMode};

pub use rmcp::{
    model::{CallToolResult, Content, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;

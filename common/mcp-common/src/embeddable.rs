//! In-process tool servers
//!
//! [`EmbeddableMcp`] lets a host call a server's tools directly, without
//! spawning it or speaking the protocol over a pipe. Tests use it to drive a
//! server's tools the same way `megatool run` would, minus the child process.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, ErrorCode, Tool};
use serde_json::Value;

use crate::descriptor::ToolDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("tool failed: {0}")]
    Execution(String),

    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        if err.code == ErrorCode::INVALID_PARAMS {
            EmbeddableError::InvalidParams(err.message.into_owned())
        } else {
            EmbeddableError::Execution(err.message.into_owned())
        }
    }
}

pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Name used in `megatool-<name>` and client configs
    fn server_name(&self) -> &str;

    fn list_tools(&self) -> Vec<Tool>;

    /// Run tool `name` with a JSON object of arguments
    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }

    /// Flat parameter lists for every tool, sorted by tool name
    fn describe_tools(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.list_tools().iter().map(ToolDescriptor::from_tool).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }
}

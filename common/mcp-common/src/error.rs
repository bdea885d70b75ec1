//! Turning failures into protocol errors
//!
//! Tool handlers return [`McpResult`]. Anything implementing
//! [`IntoMcpError`] can be lifted with [`ResultExt::to_mcp_err`] so `?`
//! works inside a tool.

use rmcp::ErrorData as McpError;

use crate::descriptor::DescriptorError;

pub type McpResult<T> = Result<T, McpError>;

pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for std::io::Error {
    fn into_mcp_error(self) -> McpError {
        internal_error(format!("I/O failure: {}", self))
    }
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        // Bad input shape is the caller's problem, not ours
        if self.is_data() || self.is_syntax() {
            invalid_params(self.to_string())
        } else {
            internal_error(format!("JSON failure: {}", self))
        }
    }
}

impl IntoMcpError for anyhow::Error {
    fn into_mcp_error(self) -> McpError {
        internal_error(format!("{:#}", self))
    }
}

impl IntoMcpError for DescriptorError {
    fn into_mcp_error(self) -> McpError {
        internal_error(self.to_string())
    }
}

impl IntoMcpError for String {
    fn into_mcp_error(self) -> McpError {
        internal_error(self)
    }
}

impl IntoMcpError for &str {
    fn into_mcp_error(self) -> McpError {
        internal_error(self)
    }
}

pub trait ResultExt<T> {
    fn to_mcp_err(self) -> McpResult<T>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> McpResult<T> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

/// Use when the caller sent arguments the tool cannot work with
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

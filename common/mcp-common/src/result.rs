//! Successful tool responses

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::{McpResult, ResultExt};

/// Serialize `data` as pretty JSON text content
pub fn json_success<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    let json = serde_json::to_string_pretty(data).to_mcp_err()?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

//! Result helpers for MCP tool and resource responses

use rmcp::{
    model::{CallToolResult, Content, ReadResourceResult, ResourceContents},
    ErrorData as McpError,
};
use serde::Serialize;

/// Pretty-printed JSON as a successful tool result
///
/// ```rust,ignore
/// fn my_tool(&self) -> Result<CallToolResult, McpError> {
///     json_success(&MyData { value: 42 })
/// }
/// ```
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Pretty-printed JSON as the contents of resource `uri`
pub fn json_resource<T: Serialize>(uri: &str, data: &T) -> Result<ReadResourceResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(json, uri)],
    })
}

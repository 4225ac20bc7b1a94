//! Error constructors for MCP servers
//!
//! Servers keep their own domain error enums and convert at the tool
//! boundary with these helpers, choosing the code by who is at fault.

use rmcp::ErrorData as McpError;

/// The server failed; the request itself may have been fine
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

/// The caller sent something the server will not act on
pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

/// A resource URI the server does not publish
pub fn resource_not_found(uri: &str) -> McpError {
    McpError::resource_not_found(format!("Unknown resource: {}", uri), None)
}

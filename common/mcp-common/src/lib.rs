//! MCP Common - Shared utilities for MCP servers
//!
//! - **Initialization**: [`init_tracing`] for stderr logging (stdout carries the protocol)
//! - **Results**: helpers for building tool and resource responses
//! - **Errors**: constructors for the MCP error codes servers report
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{json_success, invalid_params};
//!
//! fn my_tool(&self, name: &str) -> Result<CallToolResult, McpError> {
//!     if name.is_empty() {
//!         return Err(invalid_params("name cannot be empty"));
//!     }
//!     json_success(&lookup(name))
//! }
//! ```

pub mod error;
pub mod init;
pub mod result;

pub use error::{internal_error, invalid_params, resource_not_found};
pub use init::{init_tracing, LogFormat};
pub use result::{json_resource, json_success};

// Re-export rmcp types that are commonly needed
pub use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};

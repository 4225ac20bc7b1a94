//! Postgres MCP Library
//!
//! Read-only PostgreSQL access for tool-calling agents. Every statement,
//! whether sent by the client or built by the server, passes the
//! [`classifier`] and runs through the row-bounded [`executor`].
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use postgres_mcp::{config::Config, executor::BoundedExecutor, pool, PostgresMcpServer};
//!
//! let config = Config::load(None)?.with_url_override(Some(url));
//! let pool = pool::connect(&config).await?;
//! let server = PostgresMcpServer::new(BoundedExecutor::new(pool));
//! // Serve via stdio or an in-memory transport
//! ```

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod executor;
pub mod handlers;
pub mod identifier;
pub mod introspection;
pub mod params;
pub mod pool;
pub mod server;
pub mod types;

// Re-export main server type
pub use server::PostgresMcpServer;

// Re-export the gate for direct API usage
pub use classifier::{classify, SqlStatement, Verdict};
pub use executor::{BoundedExecutor, ExecutionRequest};
pub use identifier::{sanitize, Identifier};
pub use params::*;
pub use types::{GateError, QueryResult};

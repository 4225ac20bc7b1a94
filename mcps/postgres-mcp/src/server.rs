//! MCP Server implementation for read-only PostgreSQL access
//!
//! Tools and resources delegate to the handlers and the introspection
//! module; every path ends in the bounded executor.

use mcp_common::{json_resource, resource_not_found, CallToolResult, McpError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        AnnotateAble, ListResourcesResult, PaginatedRequestParam, RawResource,
        ReadResourceRequestParam, ReadResourceResult, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router, RoleServer,
};

use crate::executor::BoundedExecutor;
use crate::handlers::{self, gate_error_to_mcp};
use crate::introspection;
use crate::params::*;

/// URI of the full schema descriptor resource
pub const SCHEMA_URI: &str = "postgres://schema";

/// URI of the flat table list resource
pub const TABLES_URI: &str = "postgres://tables";

/// The postgres MCP Server
#[derive(Clone)]
pub struct PostgresMcpServer {
    executor: BoundedExecutor,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl PostgresMcpServer {
    /// Create a server over an already-built executor
    pub fn new(executor: BoundedExecutor) -> Self {
        Self {
            executor,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Run a read-only SQL query. Only SELECT, WITH, EXPLAIN, SHOW and DESCRIBE are accepted; statements containing INSERT, UPDATE, DELETE, DROP, CREATE, ALTER, TRUNCATE, GRANT, REVOKE, EXECUTE, CALL, COPY, INTO, set_config or a second statement are rejected. Returns rows, rowCount and fields. Results are capped at `limit` rows (1-1000, default 100)."
    )]
    async fn execute_sql(
        &self,
        Parameters(params): Parameters<ExecuteSqlParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::execute_sql(&self.executor, params).await
    }

    #[tool(
        description = "Describe a table: its columns (name, type, nullable), exact row count, and a sample of up to 5 rows."
    )]
    async fn get_table_info(
        &self,
        Parameters(params): Parameters<GetTableInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::get_table_info(&self.executor, params).await
    }

    #[tool(
        description = "Analyze a table. summary: row and column counts. distribution: most frequent values of the first column. nulls: null count per column. duplicates: rows occurring more than once. trends: daily row counts over the first date/timestamp column."
    )]
    async fn analyze_data(
        &self,
        Parameters(params): Parameters<AnalyzeDataParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::analyze_data(&self.executor, params).await
    }

    #[tool(
        description = "Find tables and/or columns whose names match a pattern ('*' any characters, '?' one character)."
    )]
    async fn search_tables(
        &self,
        Parameters(params): Parameters<SearchTablesParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::search_tables(&self.executor, params).await
    }

    #[tool(description = "Show the PostgreSQL execution plan for a read-only query.")]
    async fn explain_query(
        &self,
        Parameters(params): Parameters<ExplainQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::explain_query(&self.executor, params).await
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for PostgresMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only PostgreSQL MCP server. Use search_tables or the postgres://tables \
                 resource to find tables, get_table_info for structure and samples, \
                 analyze_data for quick profiling, and execute_sql for read-only queries. \
                 Statements that modify data or schema are rejected."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut schema = RawResource::new(SCHEMA_URI, "schema");
        schema.description = Some("All user tables with their columns".to_string());
        schema.mime_type = Some("application/json".to_string());

        let mut tables = RawResource::new(TABLES_URI, "tables");
        tables.description = Some("Names of all user tables and views".to_string());
        tables.mime_type = Some("application/json".to_string());

        Ok(ListResourcesResult::with_all_items(vec![
            schema.no_annotation(),
            tables.no_annotation(),
        ]))
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri, .. }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match uri.as_str() {
            SCHEMA_URI => {
                let descriptor = introspection::schema_descriptor(&self.executor)
                    .await
                    .map_err(gate_error_to_mcp)?;
                json_resource(&uri, &descriptor)
            }
            TABLES_URI => {
                let names = introspection::table_names(&self.executor)
                    .await
                    .map_err(gate_error_to_mcp)?;
                json_resource(&uri, &names)
            }
            _ => Err(resource_not_found(&uri)),
        }
    }
}

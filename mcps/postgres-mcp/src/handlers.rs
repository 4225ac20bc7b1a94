//! Tool handlers
//!
//! Each handler sanitizes its inputs, runs the request through the
//! executor, and converts gate errors into MCP errors.

use mcp_common::{internal_error, invalid_params, json_success, CallToolResult, McpError};

use crate::analysis::{self, AnalysisKind};
use crate::classifier::{classify, SqlStatement, Verdict};
use crate::executor::{limit_from_number, BoundedExecutor, ExecutionRequest};
use crate::identifier::{sanitize, sanitize_pattern};
use crate::introspection;
use crate::params::*;
use crate::types::GateError;

// ============================================================================
// Helper Functions
// ============================================================================

/// Caller errors become invalid_params; everything else is internal
pub fn gate_error_to_mcp(err: GateError) -> McpError {
    if err.is_caller_error() {
        invalid_params(err.to_string())
    } else {
        tracing::warn!(error = %err, "Tool call failed");
        internal_error(err.to_string())
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

pub async fn execute_sql(
    executor: &BoundedExecutor,
    params: ExecuteSqlParams,
) -> Result<CallToolResult, McpError> {
    let limit = limit_from_number(params.limit).map_err(gate_error_to_mcp)?;

    let request = ExecutionRequest::new(SqlStatement::new(params.query)).with_limit(limit);
    let result = executor.execute(request).await.map_err(gate_error_to_mcp)?;

    json_success(&result)
}

pub async fn get_table_info(
    executor: &BoundedExecutor,
    params: GetTableInfoParams,
) -> Result<CallToolResult, McpError> {
    let table = sanitize(&params.table_name).map_err(gate_error_to_mcp)?;

    let info = introspection::table_info(executor, &table)
        .await
        .map_err(gate_error_to_mcp)?;

    json_success(&info)
}

pub async fn analyze_data(
    executor: &BoundedExecutor,
    params: AnalyzeDataParams,
) -> Result<CallToolResult, McpError> {
    let table = sanitize(&params.table_name).map_err(gate_error_to_mcp)?;
    let kind: AnalysisKind = params.analysis_type.parse().map_err(invalid_params)?;

    let output = analysis::analyze(executor, &table, kind)
        .await
        .map_err(gate_error_to_mcp)?;

    json_success(&output)
}

pub async fn search_tables(
    executor: &BoundedExecutor,
    params: SearchTablesParams,
) -> Result<CallToolResult, McpError> {
    let pattern = sanitize_pattern(&params.pattern).map_err(gate_error_to_mcp)?;
    let search_type = params.search_type.unwrap_or_default();

    let output = introspection::search(executor, &pattern, search_type)
        .await
        .map_err(gate_error_to_mcp)?;

    json_success(&output)
}

pub async fn explain_query(
    executor: &BoundedExecutor,
    params: ExplainQueryParams,
) -> Result<CallToolResult, McpError> {
    // Judge the inner statement on its own so the reason names its keyword
    if let Verdict::Denied(reason) = classify(&params.query) {
        return Err(gate_error_to_mcp(GateError::Validation(reason)));
    }

    let statement = SqlStatement::new(format!("EXPLAIN {}", params.query.trim()));
    let result = executor
        .execute(ExecutionRequest::new(statement))
        .await
        .map_err(gate_error_to_mcp)?;

    json_success(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rmcp::model::ErrorCode;

    fn lazy_executor() -> BoundedExecutor {
        let config = Config::default().with_url_override(Some("postgres://localhost:1/none".into()));
        BoundedExecutor::new(crate::pool::connect_lazy(&config).unwrap())
    }

    #[test]
    fn test_error_mapping() {
        let err = gate_error_to_mcp(GateError::Limit("limit must be between 1 and 1000".into()));
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Limit error"));

        let err = gate_error_to_mcp(GateError::PoolExhausted(5));
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_execute_sql_rejects_mutation() {
        let params = ExecuteSqlParams {
            query: "DELETE FROM users".into(),
            limit: None,
        };
        let err = execute_sql(&lazy_executor(), params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("only read-only statements are permitted: DELETE"));
    }

    #[tokio::test]
    async fn test_execute_sql_rejects_fractional_limit() {
        let params = ExecuteSqlParams {
            query: "SELECT 1".into(),
            limit: Some(10.5),
        };
        let err = execute_sql(&lazy_executor(), params).await.unwrap_err();
        assert!(err.message.contains("limit must be an integer"));
    }

    #[tokio::test]
    async fn test_get_table_info_rejects_injection() {
        let params = GetTableInfoParams {
            table_name: "users; DROP TABLE x".into(),
        };
        let err = get_table_info(&lazy_executor(), params).await.unwrap_err();
        assert!(err.message.contains("Invalid identifier"));
    }

    #[tokio::test]
    async fn test_analyze_data_rejects_unknown_kind() {
        let params = AnalyzeDataParams {
            table_name: "orders".into(),
            analysis_type: "histogram".into(),
        };
        let err = analyze_data(&lazy_executor(), params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("unknown analysis type"));
    }

    #[tokio::test]
    async fn test_search_tables_rejects_pattern_injection() {
        let params = SearchTablesParams {
            pattern: "x' OR '1'='1".into(),
            search_type: None,
        };
        let err = search_tables(&lazy_executor(), params).await.unwrap_err();
        assert!(err.message.contains("disallowed character"));
    }

    #[tokio::test]
    async fn test_explain_rejects_inner_mutation() {
        let params = ExplainQueryParams {
            query: "UPDATE users SET admin = true".into(),
        };
        let err = explain_query(&lazy_executor(), params).await.unwrap_err();
        assert!(err.message.contains("only read-only statements are permitted: UPDATE"));
    }
}

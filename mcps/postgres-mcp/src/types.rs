//! Type definitions for postgres MCP

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single result row keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Response Types
// ============================================================================

/// Column metadata for a query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    /// Postgres type OID, when the driver reports one
    pub data_type_id: Option<u32>,
}

/// Normalized result of a bounded execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub fields: Vec<FieldInfo>,
}

impl QueryResult {
    /// Read a text column from the first row
    pub fn first_text(&self, column: &str) -> Option<String> {
        self.rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Read an integer column from the first row
    pub fn first_i64(&self, column: &str) -> Option<i64> {
        self.rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(|v| v.as_i64())
    }
}

/// Column description as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

/// One table in a schema snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Read-only snapshot of every user table and its columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

/// Response for get_table_info
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    pub row_count: i64,
    pub sample: Vec<Row>,
}

/// Response for analyze_data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub table: String,
    pub analysis_type: String,
    pub result: QueryResult,
}

/// A column matched by search_tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMatch {
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Response for search_tables
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    pub pattern: String,
    pub search_type: String,
    pub tables: Vec<String>,
    pub columns: Vec<ColumnMatch>,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Limit error: {0}")]
    Limit(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unsupported analysis: {0}")]
    UnsupportedAnalysis(String),

    #[error("Connection pool exhausted: no connection available within {0}s, retry later")]
    PoolExhausted(u64),

    #[error("Database error: {0}")]
    Database(String),
}

impl GateError {
    /// Whether the caller caused the failure and must change the request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GateError::Validation(_)
                | GateError::Limit(_)
                | GateError::InvalidIdentifier(_)
                | GateError::UnsupportedAnalysis(_)
        )
    }
}

//! Parameter types for postgres MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::introspection::SearchType;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteSqlParams {
    #[schemars(
        description = "Read-only SQL to run. Only SELECT, WITH, EXPLAIN, SHOW and DESCRIBE statements are accepted, one statement per call."
    )]
    pub query: String,

    #[schemars(
        description = "Maximum rows to return, an integer from 1 to 1000 (optional, defaults to 100)"
    )]
    #[serde(default)]
    pub limit: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetTableInfoParams {
    #[schemars(description = "Table name, optionally schema-qualified (e.g. 'users' or 'sales.orders')")]
    pub table_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeDataParams {
    #[schemars(description = "Table name, optionally schema-qualified")]
    pub table_name: String,

    #[schemars(
        description = "Analysis to run: summary, distribution, nulls, duplicates, or trends"
    )]
    pub analysis_type: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchTablesParams {
    #[schemars(
        description = "Name pattern: letters, digits and '_', with '*' or '%' for any run of characters and '?' for one character. Without wildcards the pattern matches anywhere in the name."
    )]
    pub pattern: String,

    #[schemars(description = "What to search: tables, columns, or both (optional, defaults to both)")]
    #[serde(default)]
    pub search_type: Option<SearchType>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExplainQueryParams {
    #[schemars(description = "Read-only SQL statement to explain (without the EXPLAIN keyword)")]
    pub query: String,
}

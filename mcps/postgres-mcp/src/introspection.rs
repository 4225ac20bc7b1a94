//! Introspection query builder
//!
//! Fixed catalog statements. The only caller-controlled input is a
//! sanitized [`Identifier`] or [`SearchPattern`]; every statement still
//! goes through the executor and therefore the classifier.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classifier::SqlStatement;
use crate::executor::{BoundedExecutor, ExecutionRequest, MAX_ROW_LIMIT};
use crate::identifier::{Identifier, SearchPattern};
use crate::types::{
    ColumnMatch, ColumnSchema, GateError, QueryResult, SchemaDescriptor, TableInfo, TableSchema,
};

/// Rows returned in a table sample
pub const SAMPLE_ROWS: i64 = 5;

const USER_SCHEMAS: &str = "NOT IN ('pg_catalog', 'information_schema')";

const TABLE_TYPES: &str = "IN ('BASE TABLE', 'VIEW')";

// Unqualified for public tables, schema.name otherwise
const DISPLAY_NAME: &str = "CASE WHEN table_schema = 'public' THEN table_name::text \
     ELSE table_schema::text || '.' || table_name::text END";

/// Which catalog objects search_tables matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Tables,
    Columns,
    #[default]
    Both,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Tables => "tables",
            SearchType::Columns => "columns",
            SearchType::Both => "both",
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// All user tables and views
pub fn list_tables_sql() -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT {DISPLAY_NAME} AS name, table_type::text AS kind \
         FROM information_schema.tables \
         WHERE table_schema {USER_SCHEMAS} AND table_type {TABLE_TYPES} \
         ORDER BY table_schema, table_name"
    ))
}

/// Column metadata for one table, in ordinal order
pub fn columns_sql(table: &Identifier) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT column_name::text AS name, data_type::text AS type, \
         (is_nullable = 'YES') AS nullable \
         FROM information_schema.columns \
         WHERE table_schema = {} AND table_name = {} \
         ORDER BY ordinal_position",
        table.schema_literal(),
        table.name_literal()
    ))
}

/// Exact row count
pub fn row_count_sql(table: &Identifier) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT COUNT(*) AS row_count FROM {}",
        table.qualified()
    ))
}

/// Unordered sample; the executor bounds it to [`SAMPLE_ROWS`]
pub fn sample_sql(table: &Identifier) -> SqlStatement {
    SqlStatement::new(format!("SELECT * FROM {}", table.qualified()))
}

/// One row per table with its columns aggregated as JSON
pub fn schema_sql() -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT {DISPLAY_NAME} AS name, \
         json_agg(json_build_object('name', column_name::text, 'type', data_type::text, \
         'nullable', is_nullable = 'YES') ORDER BY ordinal_position) AS columns \
         FROM information_schema.columns \
         WHERE table_schema {USER_SCHEMAS} \
         AND (table_schema, table_name) IN (\
         SELECT table_schema, table_name FROM information_schema.tables \
         WHERE table_type {TABLE_TYPES}) \
         GROUP BY table_schema, table_name \
         ORDER BY table_schema, table_name"
    ))
}

/// Tables whose name matches the pattern
pub fn search_tables_sql(pattern: &SearchPattern) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT {DISPLAY_NAME} AS name \
         FROM information_schema.tables \
         WHERE table_schema {USER_SCHEMAS} AND table_type {TABLE_TYPES} \
         AND table_name::text ILIKE {} \
         ORDER BY table_schema, table_name",
        pattern.literal()
    ))
}

/// Columns whose name matches the pattern
pub fn search_columns_sql(pattern: &SearchPattern) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT {DISPLAY_NAME} AS table_name, column_name::text AS column_name, \
         data_type::text AS type \
         FROM information_schema.columns \
         WHERE table_schema {USER_SCHEMAS} \
         AND column_name::text ILIKE {} \
         ORDER BY table_schema, table_name, ordinal_position",
        pattern.literal()
    ))
}

// ============================================================================
// Assembly
// ============================================================================

async fn run(
    executor: &BoundedExecutor,
    statement: SqlStatement,
    limit: i64,
) -> Result<QueryResult, GateError> {
    executor
        .execute(ExecutionRequest::new(statement).with_limit(Some(limit)))
        .await
}

fn rows_as<T: DeserializeOwned>(result: QueryResult) -> Result<Vec<T>, GateError> {
    result
        .rows
        .into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row))
                .map_err(|e| GateError::Database(format!("unexpected catalog row: {}", e)))
        })
        .collect()
}

fn text_column(result: &QueryResult, column: &str) -> Vec<String> {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect()
}

/// Flat list of table names
pub async fn table_names(executor: &BoundedExecutor) -> Result<Vec<String>, GateError> {
    let result = run(executor, list_tables_sql(), MAX_ROW_LIMIT).await?;
    Ok(text_column(&result, "name"))
}

/// Snapshot of every user table and its columns
pub async fn schema_descriptor(executor: &BoundedExecutor) -> Result<SchemaDescriptor, GateError> {
    let result = run(executor, schema_sql(), MAX_ROW_LIMIT).await?;
    let tables: Vec<TableSchema> = rows_as(result)?;
    Ok(SchemaDescriptor { tables })
}

/// Columns of one table; a table with no catalog columns does not exist
pub async fn table_columns(
    executor: &BoundedExecutor,
    table: &Identifier,
) -> Result<Vec<ColumnSchema>, GateError> {
    let result = run(executor, columns_sql(table), MAX_ROW_LIMIT).await?;
    let columns: Vec<ColumnSchema> = rows_as(result)?;
    if columns.is_empty() {
        return Err(GateError::Database(format!("table not found: {}", table)));
    }
    Ok(columns)
}

/// Columns, exact row count and a small sample
pub async fn table_info(
    executor: &BoundedExecutor,
    table: &Identifier,
) -> Result<TableInfo, GateError> {
    let columns = table_columns(executor, table).await?;

    let count = run(executor, row_count_sql(table), 1).await?;
    let row_count = count.first_i64("row_count").unwrap_or(0);

    let sample = run(executor, sample_sql(table), SAMPLE_ROWS).await?;

    Ok(TableInfo {
        table: table.to_string(),
        columns,
        row_count,
        sample: sample.rows,
    })
}

#[derive(Deserialize)]
struct ColumnMatchRow {
    table_name: String,
    column_name: String,
    #[serde(rename = "type")]
    data_type: String,
}

/// Match table and/or column names against a sanitized pattern
pub async fn search(
    executor: &BoundedExecutor,
    pattern: &SearchPattern,
    search_type: SearchType,
) -> Result<crate::types::SearchOutput, GateError> {
    let tables = match search_type {
        SearchType::Tables | SearchType::Both => {
            let result = run(executor, search_tables_sql(pattern), MAX_ROW_LIMIT).await?;
            text_column(&result, "name")
        }
        SearchType::Columns => Vec::new(),
    };

    let columns = match search_type {
        SearchType::Columns | SearchType::Both => {
            let result = run(executor, search_columns_sql(pattern), MAX_ROW_LIMIT).await?;
            rows_as::<ColumnMatchRow>(result)?
                .into_iter()
                .map(|row| ColumnMatch {
                    table: row.table_name,
                    column: row.column_name,
                    data_type: row.data_type,
                })
                .collect()
        }
        SearchType::Tables => Vec::new(),
    };

    Ok(crate::types::SearchOutput {
        pattern: pattern.original().to_string(),
        search_type: search_type.as_str().to_string(),
        tables,
        columns,
    })
}

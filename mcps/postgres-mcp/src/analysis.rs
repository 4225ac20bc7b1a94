//! Analysis query builder
//!
//! Statement templates for the fixed analysis kinds. Templates take only
//! sanitized identifiers; column names read back from the catalog are
//! sanitized again before use.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classifier::SqlStatement;
use crate::executor::{BoundedExecutor, ExecutionRequest, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT};
use crate::identifier::{self, Identifier};
use crate::introspection;
use crate::types::{AnalysisOutput, ColumnSchema, GateError};

/// Most frequent values returned by a distribution
pub const DISTRIBUTION_BUCKETS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Summary,
    Distribution,
    Nulls,
    Duplicates,
    Trends,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Summary,
        AnalysisKind::Distribution,
        AnalysisKind::Nulls,
        AnalysisKind::Duplicates,
        AnalysisKind::Trends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::Distribution => "distribution",
            AnalysisKind::Nulls => "nulls",
            AnalysisKind::Duplicates => "duplicates",
            AnalysisKind::Trends => "trends",
        }
    }

    /// Row ceiling used when running this kind
    fn row_limit(&self) -> i64 {
        match self {
            AnalysisKind::Summary => 1,
            AnalysisKind::Distribution => DISTRIBUTION_BUCKETS,
            AnalysisKind::Duplicates => DEFAULT_ROW_LIMIT,
            AnalysisKind::Nulls | AnalysisKind::Trends => MAX_ROW_LIMIT,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AnalysisKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown analysis type '{}', expected one of: summary, distribution, nulls, duplicates, trends",
                    wanted
                )
            })
    }
}

/// A catalog column whose name passed the sanitizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: Identifier,
    pub data_type: String,
}

impl TableColumn {
    pub fn from_schema(column: &ColumnSchema) -> Result<Self, GateError> {
        Ok(Self {
            name: identifier::sanitize(&column.name)?,
            data_type: column.data_type.clone(),
        })
    }

    /// date and timestamp columns; time-of-day and interval do not bucket by day
    pub fn is_temporal(&self) -> bool {
        let ty = self.data_type.to_ascii_lowercase();
        ty == "date" || ty.starts_with("timestamp")
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Row count and column count
pub fn summary_sql(table: &Identifier) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT COUNT(*) AS row_count, \
         (SELECT COUNT(*) FROM information_schema.columns \
         WHERE table_schema = {} AND table_name = {}) AS column_count \
         FROM {}",
        table.schema_literal(),
        table.name_literal(),
        table.qualified()
    ))
}

/// Most frequent values of one column
pub fn distribution_sql(table: &Identifier, column: &Identifier) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT {col} AS value, COUNT(*) AS count FROM {table} \
         GROUP BY {col} ORDER BY count DESC LIMIT {DISTRIBUTION_BUCKETS}",
        col = column.quoted(),
        table = table.qualified()
    ))
}

/// Null count per column via conditional aggregation.
///
/// One row per column (`column_name`, `null_count`, `total_rows`). Aggregates
/// are aliased by position so column names never become output names.
pub fn nulls_sql(table: &Identifier, columns: &[Identifier]) -> SqlStatement {
    let counts: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            format!(
                "COALESCE(SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END), 0) AS n{}",
                col.quoted(),
                i + 1
            )
        })
        .collect();
    let pairs: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("({}, c.n{})", col.name_literal(), i + 1))
        .collect();

    SqlStatement::new(format!(
        "SELECT v.column_name, v.null_count, c.total_rows \
         FROM (SELECT COUNT(*) AS total_rows, {} FROM {}) AS c \
         CROSS JOIN LATERAL (VALUES {}) AS v(column_name, null_count)",
        counts.join(", "),
        table.qualified(),
        pairs.join(", ")
    ))
}

/// Rows that occur more than once across all columns
pub fn duplicates_sql(table: &Identifier, columns: &[Identifier]) -> SqlStatement {
    let list = columns
        .iter()
        .map(Identifier::quoted)
        .collect::<Vec<_>>()
        .join(", ");

    SqlStatement::new(format!(
        "SELECT {list}, COUNT(*) AS occurrences FROM {} \
         GROUP BY {list} HAVING COUNT(*) > 1 ORDER BY occurrences DESC",
        table.qualified()
    ))
}

/// Daily row counts over a temporal column
pub fn trends_sql(table: &Identifier, column: &Identifier) -> SqlStatement {
    SqlStatement::new(format!(
        "SELECT DATE_TRUNC('day', {col}) AS period, COUNT(*) AS count FROM {table} \
         WHERE {col} IS NOT NULL GROUP BY period ORDER BY period",
        col = column.quoted(),
        table = table.qualified()
    ))
}

/// Choose and build the statement for `kind` given the table's columns
pub fn build(
    kind: AnalysisKind,
    table: &Identifier,
    columns: &[TableColumn],
) -> Result<SqlStatement, GateError> {
    if kind == AnalysisKind::Summary {
        return Ok(summary_sql(table));
    }

    let first = columns.first().ok_or_else(|| {
        GateError::UnsupportedAnalysis(format!("table {} has no columns", table))
    })?;

    let statement = match kind {
        AnalysisKind::Summary => summary_sql(table),
        AnalysisKind::Distribution => distribution_sql(table, &first.name),
        AnalysisKind::Nulls => {
            let names: Vec<Identifier> = columns.iter().map(|c| c.name.clone()).collect();
            nulls_sql(table, &names)
        }
        AnalysisKind::Duplicates => {
            let names: Vec<Identifier> = columns.iter().map(|c| c.name.clone()).collect();
            duplicates_sql(table, &names)
        }
        AnalysisKind::Trends => {
            let temporal = columns.iter().find(|c| c.is_temporal()).ok_or_else(|| {
                GateError::UnsupportedAnalysis(format!(
                    "trends requires a date or timestamp column, table {} has none",
                    table
                ))
            })?;
            trends_sql(table, &temporal.name)
        }
    };
    Ok(statement)
}

/// Run one analysis kind against a table
pub async fn analyze(
    executor: &BoundedExecutor,
    table: &Identifier,
    kind: AnalysisKind,
) -> Result<AnalysisOutput, GateError> {
    let schema = introspection::table_columns(executor, table).await?;
    let columns = schema
        .iter()
        .map(TableColumn::from_schema)
        .collect::<Result<Vec<_>, _>>()?;

    let statement = build(kind, table, &columns)?;
    tracing::debug!(table = %table, kind = %kind, "Running analysis");

    let result = executor
        .execute(ExecutionRequest::new(statement).with_limit(Some(kind.row_limit())))
        .await?;

    Ok(AnalysisOutput {
        table: table.to_string(),
        analysis_type: kind.as_str().to_string(),
        result,
    })
}

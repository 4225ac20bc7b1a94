//! Bounded executor
//!
//! The single path to the database. Each call classifies the statement,
//! resolves the row limit, appends a LIMIT clause when the statement has
//! none, and runs exactly one statement on a pooled connection.

use std::sync::LazyLock;
use std::time::Duration;

use futures::TryStreamExt;
use regex::Regex;
use sqlx::postgres::{PgColumn, PgPool, PgRow};
use sqlx::{Column, Executor as _, Row as _, Statement as _, TypeInfo};

use crate::classifier::{blank_comments, classify_statement, SqlStatement, Verdict};
use crate::config::redact_credentials;
use crate::identifier;
use crate::introspection;
use crate::types::{FieldInfo, GateError, QueryResult, Row};

/// Rows returned when the caller does not ask for a limit
pub const DEFAULT_ROW_LIMIT: i64 = 100;

/// Largest limit a caller may request
pub const MAX_ROW_LIMIT: i64 = 1000;

// Trailing LIMIT/OFFSET in either order, or FETCH FIRST|NEXT ... ONLY
static TRAILING_LIMIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(?:\bLIMIT\s+\d+(?:\s+OFFSET\s+\d+(?:\s+ROWS?)?)?|\bOFFSET\s+\d+(?:\s+ROWS?)?\s+LIMIT\s+\d+|\bFETCH\s+(?:FIRST|NEXT)\s+(?:\d+\s+)?ROWS?\s+ONLY)\s*$",
    )
    .expect("Invalid limit regex")
});

// Trailing LIMIT ALL, which bounds nothing
static TRAILING_LIMIT_ALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?P<all>\bLIMIT\s+ALL\b)(?P<tail>(?:\s+OFFSET\s+\d+(?:\s+ROWS?)?)?)\s*$")
        .expect("Invalid limit all regex")
});

/// A statement plus the caller's requested row limit
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub statement: SqlStatement,
    pub requested_limit: Option<i64>,
}

impl ExecutionRequest {
    pub fn new(statement: SqlStatement) -> Self {
        Self {
            statement,
            requested_limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.requested_limit = limit;
        self
    }
}

/// Resolve the effective row limit. Absent means the default; out of range is rejected.
pub fn resolve_limit(requested: Option<i64>) -> Result<i64, GateError> {
    match requested {
        None => Ok(DEFAULT_ROW_LIMIT),
        Some(limit) if (1..=MAX_ROW_LIMIT).contains(&limit) => Ok(limit),
        Some(limit) => Err(GateError::Limit(format!(
            "limit must be between 1 and {}, got {}",
            MAX_ROW_LIMIT, limit
        ))),
    }
}

/// Convert a JSON number to an integer limit, rejecting fractions
pub fn limit_from_number(value: Option<f64>) -> Result<Option<i64>, GateError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => Ok(Some(v as i64)),
        Some(v) => Err(GateError::Limit(format!("limit must be an integer, got {}", v))),
    }
}

/// Whether the statement already ends in a limiting clause, ignoring comments
pub fn has_limit_clause(sql: &str) -> bool {
    TRAILING_LIMIT_REGEX.is_match(&blank_comments(sql))
}

/// SQL text to run for an allowed statement under `limit`
pub fn bounded_sql(statement: &SqlStatement, limit: i64) -> String {
    let text = statement.executable_text();
    if !matches!(statement.effective_keyword().as_deref(), Some("SELECT")) {
        return text.to_string();
    }

    let code = blank_comments(text);
    if TRAILING_LIMIT_REGEX.is_match(&code) {
        return text.to_string();
    }

    // Offsets in `code` match `text`, so the prefix comes from the original
    if let Some(caps) = TRAILING_LIMIT_ALL_REGEX.captures(&code) {
        if let (Some(all), Some(tail)) = (caps.name("all"), caps.name("tail")) {
            return format!("{}LIMIT {}{}", &text[..all.start()], limit, tail.as_str());
        }
    }

    format!("{}\nLIMIT {}", text, limit)
}

/// Executes validated statements against an explicitly passed pool
#[derive(Clone)]
pub struct BoundedExecutor {
    pool: PgPool,
}

impl BoundedExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one request through the gate
    pub async fn execute(&self, request: ExecutionRequest) -> Result<QueryResult, GateError> {
        let ExecutionRequest {
            statement,
            requested_limit,
        } = request;

        if let Verdict::Denied(reason) = classify_statement(&statement) {
            tracing::warn!(
                reason = %reason,
                statement_len = statement.as_str().len(),
                "Statement denied"
            );
            return Err(GateError::Validation(reason));
        }

        let limit = resolve_limit(requested_limit)?;

        // DESCRIBE is not native to Postgres; answer it from the catalog
        let statement = if statement.leading_keyword() == Some("DESCRIBE") {
            let rewritten = describe_sql(&statement)?;
            if let Verdict::Denied(reason) = classify_statement(&rewritten) {
                return Err(GateError::Validation(reason));
            }
            rewritten
        } else {
            statement
        };

        let sql = bounded_sql(&statement, limit);
        let result = self.fetch(&sql, limit).await?;

        tracing::debug!(limit, row_count = result.row_count, "Statement executed");
        Ok(result)
    }

    /// Prepare once for the field list, then stream at most `limit` rows
    async fn fetch(&self, sql: &str, limit: i64) -> Result<QueryResult, GateError> {
        let timeout = self.acquire_timeout();

        // The connection returns to the pool when dropped, on every path
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| translate_error(e, timeout))?;

        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| translate_error(e, timeout))?;
        let fields = field_info(statement.columns());

        let keep = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut rows: Vec<Row> = Vec::new();
        let mut stream = statement.query().fetch(&mut *conn);
        while rows.len() < keep {
            match stream
                .try_next()
                .await
                .map_err(|e| translate_error(e, timeout))?
            {
                Some(row) => rows.push(row_to_json(&row)),
                None => break,
            }
        }

        Ok(QueryResult {
            row_count: rows.len(),
            rows,
            fields,
        })
    }

    fn acquire_timeout(&self) -> Duration {
        self.pool.options().get_acquire_timeout()
    }
}

/// Rewrite `DESCRIBE <table>` as the catalog column query
fn describe_sql(statement: &SqlStatement) -> Result<SqlStatement, GateError> {
    let mut words = statement.executable_text().split_whitespace().skip(1);
    let target = words
        .next()
        .ok_or_else(|| GateError::Validation("DESCRIBE requires a table name".to_string()))?;
    if words.next().is_some() {
        return Err(GateError::Validation(
            "DESCRIBE takes exactly one table name".to_string(),
        ));
    }
    let table = identifier::sanitize(target)?;
    Ok(introspection::columns_sql(&table))
}

/// Map a driver error onto the gate taxonomy without leaking credentials
pub fn translate_error(err: sqlx::Error, acquire_timeout: Duration) -> GateError {
    match err {
        sqlx::Error::PoolTimedOut => GateError::PoolExhausted(acquire_timeout.as_secs()),
        sqlx::Error::Database(db) => {
            let message = match db.code() {
                Some(code) => format!("{} (SQLSTATE {})", db.message(), code),
                None => db.message().to_string(),
            };
            GateError::Database(redact_credentials(&message))
        }
        other => GateError::Database(redact_credentials(&other.to_string())),
    }
}

fn field_info(columns: &[PgColumn]) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|col| FieldInfo {
            name: col.name().to_string(),
            data_type_id: col.type_info().oid().map(|oid| oid.0),
        })
        .collect()
}

fn row_to_json(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), extract_value(row, col.ordinal())))
        .collect()
}

/// Decode one value by trying the common Postgres types in turn
fn extract_value(row: &PgRow, idx: usize) -> serde_json::Value {
    use serde_json::{json, Value};

    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(|f| json!(f)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| json!(f)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
        // Keep exact precision; floats would round
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::String(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<String>>, _>(idx) {
        return v.map(|items| json!(items)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i64>>, _>(idx) {
        return v.map(|items| json!(items)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<i32>>, _>(idx) {
        return v.map(|items| json!(items)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v
            .map(|b| Value::String(format!("<bytes {}>", b.len())))
            .unwrap_or(Value::Null);
    }

    let type_name = row
        .columns()
        .get(idx)
        .map(|c| c.type_info().name().to_string())
        .unwrap_or_default();
    tracing::debug!(column = idx, type_name = %type_name, "Undecodable value returned as null");
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn lazy_executor() -> BoundedExecutor {
        let config = Config::default().with_url_override(Some("postgres://localhost:1/none".into()));
        BoundedExecutor::new(crate::pool::connect_lazy(&config).unwrap())
    }

    #[test]
    fn test_resolve_limit() {
        assert_eq!(resolve_limit(None), Ok(100));
        assert_eq!(resolve_limit(Some(1)), Ok(1));
        assert_eq!(resolve_limit(Some(1000)), Ok(1000));
        assert!(matches!(resolve_limit(Some(0)), Err(GateError::Limit(_))));
        assert!(matches!(resolve_limit(Some(1001)), Err(GateError::Limit(_))));
        assert!(matches!(resolve_limit(Some(-5)), Err(GateError::Limit(_))));
    }

    #[test]
    fn test_limit_from_number() {
        assert_eq!(limit_from_number(None), Ok(None));
        assert_eq!(limit_from_number(Some(25.0)), Ok(Some(25)));
        assert!(matches!(limit_from_number(Some(2.5)), Err(GateError::Limit(_))));
        assert!(matches!(limit_from_number(Some(f64::NAN)), Err(GateError::Limit(_))));
        assert!(matches!(limit_from_number(Some(f64::INFINITY)), Err(GateError::Limit(_))));
    }

    #[test]
    fn test_limit_clause_detection() {
        assert!(has_limit_clause("SELECT * FROM t LIMIT 10"));
        assert!(has_limit_clause("select * from t limit 10 offset 5"));
        assert!(has_limit_clause("SELECT * FROM t OFFSET 5 LIMIT 10"));
        assert!(has_limit_clause("SELECT * FROM t LIMIT 5 -- top five"));
        assert!(has_limit_clause("SELECT * FROM t LIMIT 5 /* top */"));
        assert!(!has_limit_clause("SELECT * FROM t LIMIT ALL"));
        assert!(!has_limit_clause("SELECT * FROM big_table -- LIMIT 1"));
        assert!(!has_limit_clause("SELECT * FROM big_table /* LIMIT 1 */"));
        assert!(!has_limit_clause("SELECT * FROM t WHERE note = 'LIMIT 1'"));
        assert!(has_limit_clause("SELECT * FROM t FETCH FIRST 3 ROWS ONLY"));
        assert!(has_limit_clause("SELECT * FROM t\nlimit\n10\n"));
        assert!(!has_limit_clause("SELECT * FROM t"));
        assert!(!has_limit_clause("SELECT * FROM (SELECT * FROM t LIMIT 5) s"));
        assert!(!has_limit_clause("SELECT rate_limit FROM t"));
    }

    #[test]
    fn test_bounded_sql_appends_once() {
        let plain = SqlStatement::new("SELECT * FROM users;");
        assert_eq!(bounded_sql(&plain, 100), "SELECT * FROM users\nLIMIT 100");

        let limited = SqlStatement::new("SELECT * FROM users LIMIT 5");
        assert_eq!(bounded_sql(&limited, 100), "SELECT * FROM users LIMIT 5");

        let cte = SqlStatement::new("WITH x AS (SELECT 1) SELECT * FROM x");
        assert_eq!(
            bounded_sql(&cte, 7),
            "WITH x AS (SELECT 1) SELECT * FROM x\nLIMIT 7"
        );
    }

    #[test]
    fn test_bounded_sql_sees_through_trailing_comments() {
        let hidden = SqlStatement::new("SELECT * FROM big_table -- LIMIT 1");
        assert_eq!(
            bounded_sql(&hidden, 100),
            "SELECT * FROM big_table -- LIMIT 1\nLIMIT 100"
        );

        let block = SqlStatement::new("SELECT * FROM big_table /* LIMIT 1 */");
        assert_eq!(
            bounded_sql(&block, 100),
            "SELECT * FROM big_table /* LIMIT 1 */\nLIMIT 100"
        );

        let annotated = SqlStatement::new("SELECT * FROM t LIMIT 5 -- top five");
        assert_eq!(bounded_sql(&annotated, 100), "SELECT * FROM t LIMIT 5 -- top five");
    }

    #[test]
    fn test_bounded_sql_replaces_limit_all() {
        let all = SqlStatement::new("SELECT * FROM big_table LIMIT ALL");
        assert_eq!(bounded_sql(&all, 100), "SELECT * FROM big_table LIMIT 100");

        let with_offset = SqlStatement::new("select * from t limit all offset 10 -- page");
        assert_eq!(bounded_sql(&with_offset, 25), "select * from t LIMIT 25 offset 10");

        let offset_first = SqlStatement::new("SELECT * FROM t OFFSET 10 LIMIT ALL;");
        assert_eq!(bounded_sql(&offset_first, 5), "SELECT * FROM t OFFSET 10 LIMIT 5");
    }

    #[test]
    fn test_bounded_sql_leaves_utility_statements() {
        let show = SqlStatement::new("SHOW search_path");
        assert_eq!(bounded_sql(&show, 100), "SHOW search_path");

        let explain = SqlStatement::new("EXPLAIN SELECT * FROM t");
        assert_eq!(bounded_sql(&explain, 100), "EXPLAIN SELECT * FROM t");
    }

    #[test]
    fn test_translate_pool_timeout() {
        let err = translate_error(sqlx::Error::PoolTimedOut, Duration::from_secs(5));
        assert_eq!(err, GateError::PoolExhausted(5));
    }

    #[test]
    fn test_translate_scrubs_credentials() {
        let err = translate_error(
            sqlx::Error::Configuration("bad url postgres://u:topsecret@h/db".into()),
            Duration::from_secs(5),
        );
        match err {
            GateError::Database(msg) => assert!(!msg.contains("topsecret")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_denied_statement_never_touches_pool() {
        let executor = lazy_executor();
        let result = executor
            .execute(ExecutionRequest::new(SqlStatement::new("DROP TABLE users")))
            .await;
        assert!(matches!(result, Err(GateError::Validation(_))));
        assert_eq!(executor.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_bad_limits_rejected_before_execution() {
        let executor = lazy_executor();
        for limit in [0, 1001] {
            let result = executor
                .execute(
                    ExecutionRequest::new(SqlStatement::new("SELECT 1")).with_limit(Some(limit)),
                )
                .await;
            assert!(matches!(result, Err(GateError::Limit(_))), "limit {limit}");
        }
        assert_eq!(executor.pool().size(), 0);
    }

    #[tokio::test]
    async fn test_describe_requires_valid_name() {
        let executor = lazy_executor();
        let result = executor
            .execute(ExecutionRequest::new(SqlStatement::new("DESCRIBE \"users\"")))
            .await;
        assert!(matches!(result, Err(GateError::InvalidIdentifier(_))));

        let result = executor
            .execute(ExecutionRequest::new(SqlStatement::new("DESCRIBE")))
            .await;
        assert!(matches!(result, Err(GateError::Validation(_))));
    }
}

//! Connection pool lifecycle
//!
//! The pool is built once at startup, handed to the executor explicitly,
//! and closed by `main` after the service stops.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::config::{redact_credentials, Config};

/// Build connect options: URL, SSL override and read-only session settings
pub fn connect_options(config: &Config) -> Result<PgConnectOptions> {
    let url = config.database_url()?;
    let mut options = PgConnectOptions::from_str(url)
        .map_err(|e| anyhow::anyhow!(redact_credentials(&e.to_string())))
        .context("Invalid database URL")?;

    if let Some(mode) = &config.database.ssl_mode {
        let mode = PgSslMode::from_str(mode)
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .with_context(|| format!("Invalid ssl_mode {:?}", mode))?;
        options = options.ssl_mode(mode);
    }

    // Every session refuses writes even if a statement slips past the gate
    let mut session = vec![("default_transaction_read_only", "on".to_string())];
    if config.pool.statement_timeout_secs > 0 {
        session.push((
            "statement_timeout",
            format!("{}s", config.pool.statement_timeout_secs),
        ));
    }

    Ok(options.options(session))
}

fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.pool.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs))
}

/// Open the pool and verify one connection
pub async fn connect(config: &Config) -> Result<PgPool> {
    let options = connect_options(config)?;
    let target = redact_credentials(config.database_url()?);

    tracing::info!(
        target = %target,
        max_connections = config.pool.max_connections,
        acquire_timeout_secs = config.pool.acquire_timeout_secs,
        "Connecting to PostgreSQL"
    );

    pool_options(config)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!(redact_credentials(&e.to_string())))
        .with_context(|| format!("Failed to connect to {}", target))
}

/// Build a pool that opens connections on first use
pub fn connect_lazy(config: &Config) -> Result<PgPool> {
    let options = connect_options(config)?;
    Ok(pool_options(config).connect_lazy_with(options))
}

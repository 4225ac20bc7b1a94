//! Configuration for postgres MCP

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_CREDENTIALS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9+.\-]*://)[^@\s/]+@").expect("Invalid credentials regex")
});

static PASSWORD_PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(password\s*=\s*)[^\s&]+").expect("Invalid password regex")
});

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Connection target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL; overridden by `--database-url` / `DATABASE_URL`
    #[serde(default)]
    pub url: Option<String>,

    /// SSL mode (disable, allow, prefer, require, verify-ca, verify-full).
    /// Overrides any `sslmode` in the URL when set.
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

/// Connection pool sizing and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum pooled connections
    /// Default: 10
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection before failing
    /// Default: 5
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Server-side statement timeout in seconds (0 disables)
    /// Default: 30
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_statement_timeout() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Looks for config in:
    /// 1. `explicit` path (from `--config` / `POSTGRES_MCP_CONFIG`), which must exist
    /// 2. `~/.binks/postgres.toml`
    /// 3. `./postgres-mcp.toml`
    /// 4. `$XDG_CONFIG_HOME/postgres-mcp/config.toml`
    /// 5. Defaults if none found
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".binks").join("postgres.toml"));
        }
        candidates.push(PathBuf::from("postgres-mcp.toml"));
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("postgres-mcp").join("config.toml"));
        }

        for path in candidates {
            if path.exists() {
                let config = Self::from_file(&path)?;
                tracing::info!("Loaded config from {}", path.display());
                return Ok(config);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Apply a command-line or environment URL over the file value
    pub fn with_url_override(mut self, url: Option<String>) -> Self {
        if url.is_some() {
            self.database.url = url;
        }
        self
    }

    /// The connection URL, which is mandatory
    pub fn database_url(&self) -> Result<&str> {
        self.database
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("No database URL configured: pass --database-url, set DATABASE_URL, or set database.url in the config file")
    }
}

/// Strip credentials from text that may embed a connection string
pub fn redact_credentials(text: &str) -> String {
    let text = URL_CREDENTIALS_REGEX.replace_all(text, "${1}***@");
    PASSWORD_PARAM_REGEX
        .replace_all(&text, "${1}***")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pool.max_connections, 10);
        assert_eq!(config.pool.acquire_timeout_secs, 5);
        assert_eq!(config.pool.statement_timeout_secs, 30);
        assert!(config.database.url.is_none());
        assert!(config.database_url().is_err());
    }

    #[test]
    fn test_parse_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"postgres://localhost/app\"\nssl_mode = \"require\"\n\n[pool]\nmax_connections = 3"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/app");
        assert_eq!(config.database.ssl_mode.as_deref(), Some("require"));
        assert_eq!(config.pool.max_connections, 3);
        assert_eq!(config.pool.acquire_timeout_secs, 5);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/postgres-mcp.toml"))).is_err());
    }

    #[test]
    fn test_url_override() {
        let config = Config::default().with_url_override(Some("postgres://db/x".to_string()));
        assert_eq!(config.database_url().unwrap(), "postgres://db/x");

        let kept = config.with_url_override(None);
        assert_eq!(kept.database_url().unwrap(), "postgres://db/x");
    }

    #[test]
    fn test_redact_credentials() {
        assert_eq!(
            redact_credentials("failed to connect to postgres://admin:s3cret@db:5432/app"),
            "failed to connect to postgres://***@db:5432/app"
        );
        assert_eq!(
            redact_credentials("host=db user=admin password=s3cret dbname=app"),
            "host=db user=admin password=*** dbname=app"
        );
        assert_eq!(
            redact_credentials("relation \"users\" does not exist"),
            "relation \"users\" does not exist"
        );
    }
}

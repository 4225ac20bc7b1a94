//! Identifier sanitizer
//!
//! The only way a caller-supplied name becomes SQL text. Builders accept
//! [`Identifier`] and [`SearchPattern`], never `&str`, so an unchecked name
//! cannot reach generated SQL. Names that fail the pattern are rejected,
//! never escaped and passed through.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::GateError;

/// Schema used when a table name is not qualified
pub const DEFAULT_SCHEMA: &str = "public";

const MAX_PATTERN_LEN: usize = 128;

static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(?:\.[A-Za-z_][A-Za-z0-9_]{0,62})?$")
        .expect("Invalid identifier regex")
});

/// A validated table or column name, optionally schema-qualified
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    schema: Option<String>,
    name: String,
}

/// Validate an untrusted name
pub fn sanitize(name: &str) -> Result<Identifier, GateError> {
    if !IDENTIFIER_REGEX.is_match(name) {
        return Err(GateError::InvalidIdentifier(format!(
            "'{}' must be letters, digits and underscores, optionally qualified as schema.name",
            name.escape_debug()
        )));
    }

    let identifier = match name.split_once('.') {
        Some((schema, table)) => Identifier {
            schema: Some(schema.to_string()),
            name: table.to_string(),
        },
        None => Identifier {
            schema: None,
            name: name.to_string(),
        },
    };
    Ok(identifier)
}

impl Identifier {
    /// Schema part, or [`DEFAULT_SCHEMA`] when unqualified
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted as written: `"name"` or `"schema"."name"`
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.name),
            None => format!("\"{}\"", self.name),
        }
    }

    /// Always schema-qualified: `"schema"."name"`
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema(), self.name)
    }

    /// Schema as a string literal for catalog filters
    pub fn schema_literal(&self) -> String {
        format!("'{}'", self.schema())
    }

    /// Name as a string literal for catalog filters
    pub fn name_literal(&self) -> String {
        format!("'{}'", self.name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A validated catalog search pattern, already translated to LIKE syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPattern {
    original: String,
    like: String,
}

/// Validate a search pattern and translate `*`/`?` wildcards to `%`/`_`.
///
/// A pattern without wildcards matches anywhere in the name.
pub fn sanitize_pattern(pattern: &str) -> Result<SearchPattern, GateError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(GateError::InvalidIdentifier(
            "search pattern cannot be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_PATTERN_LEN {
        return Err(GateError::InvalidIdentifier(format!(
            "search pattern longer than {} characters",
            MAX_PATTERN_LEN
        )));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '*' | '?' | '%')))
    {
        return Err(GateError::InvalidIdentifier(format!(
            "search pattern contains disallowed character '{}'",
            bad.escape_debug()
        )));
    }

    let translated: String = trimmed
        .chars()
        .map(|c| match c {
            '*' => '%',
            '?' => '_',
            other => other,
        })
        .collect();

    let like = if trimmed.contains(['*', '?', '%']) {
        translated
    } else {
        format!("%{}%", translated)
    };

    Ok(SearchPattern {
        original: trimmed.to_string(),
        like,
    })
}

impl SearchPattern {
    /// Pattern as the caller supplied it
    pub fn original(&self) -> &str {
        &self.original
    }

    /// LIKE pattern text
    pub fn like(&self) -> &str {
        &self.like
    }

    /// LIKE pattern as a string literal
    pub fn literal(&self) -> String {
        format!("'{}'", self.like)
    }
}

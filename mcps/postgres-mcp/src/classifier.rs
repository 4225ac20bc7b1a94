//! Statement classifier - the read-only gate
//!
//! Every statement that reaches the database passes through [`classify`],
//! including statements this server builds itself. The check runs in two
//! stages: the leading keyword must be in [`ALLOWED_LEADING`], and the whole
//! text must not contain any word from [`DENIED_KEYWORDS`] or a stacked
//! statement. Both stages always run.
//!
//! The content scan is deliberately conservative. A denied word inside a
//! string literal or a quoted identifier (`SELECT 'drop'`, `"update"`) is
//! rejected; a word that only contains a denied word (`update_count`) is not.
//! `INTO` and `SET_CONFIG` are on the list because `SELECT ... INTO` creates a
//! table and `set_config` can lift the session's read-only setting.

use std::sync::LazyLock;

use regex::Regex;

/// Statement shapes admitted by the gate
pub const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW", "DESCRIBE"];

/// Words that reject a statement wherever they appear
pub const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "CALL", "COPY", "INTO", "SET_CONFIG",
];

static DENY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", DENIED_KEYWORDS.join("|")))
        .expect("Invalid deny regex")
});

// A separator followed by anything other than whitespace
static STACKED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*\S").expect("Invalid stacked statement regex"));

/// Raw SQL text with its derived matching metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    raw: String,
    normalized: String,
    leading_keyword: Option<String>,
}

impl SqlStatement {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = raw.trim().to_uppercase();
        let leading_keyword = first_word(skip_comments(&normalized)).map(str::to_string);
        Self {
            raw,
            normalized,
            leading_keyword,
        }
    }

    /// The statement exactly as received
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Trimmed, upper-cased form used for matching
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// First keyword after any leading comments
    pub fn leading_keyword(&self) -> Option<&str> {
        self.leading_keyword.as_deref()
    }

    /// The keyword that decides what the statement does.
    ///
    /// For a WITH statement this is the first keyword of the body that
    /// follows the CTE list; `None` if that body cannot be located.
    pub fn effective_keyword(&self) -> Option<String> {
        match self.leading_keyword() {
            Some("WITH") => cte_body_keyword(skip_comments(&self.normalized)),
            other => other.map(str::to_string),
        }
    }

    /// Text to send to the driver: trimmed, with one trailing `;` removed
    pub fn executable_text(&self) -> &str {
        let trimmed = self.raw.trim();
        trimmed
            .strip_suffix(';')
            .map(str::trim_end)
            .unwrap_or(trimmed)
    }
}

/// Outcome of classifying one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(String),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// Classify raw SQL text. Never fails: bad input is a `Denied` verdict.
pub fn classify(sql: &str) -> Verdict {
    classify_statement(&SqlStatement::new(sql))
}

/// Classify an already-wrapped statement
pub fn classify_statement(statement: &SqlStatement) -> Verdict {
    if statement.normalized().is_empty() {
        return Verdict::Denied("empty query".to_string());
    }

    // 1. Shape: the effective leading keyword must be allow-listed
    let keyword = match statement.effective_keyword() {
        Some(keyword) => keyword,
        None if statement.leading_keyword() == Some("WITH") => {
            return Verdict::Denied(
                "only read-only statements are permitted: WITH without a query body".to_string(),
            );
        }
        None => {
            let token: String = skip_comments(statement.normalized())
                .chars()
                .take_while(|c| !c.is_whitespace())
                .take(16)
                .collect();
            return Verdict::Denied(format!(
                "only read-only statements are permitted: {}",
                if token.is_empty() { "<none>" } else { &token }
            ));
        }
    };

    if !ALLOWED_LEADING.contains(&keyword.as_str()) {
        return Verdict::Denied(format!(
            "only read-only statements are permitted: {}",
            keyword
        ));
    }

    // 2. Content: denied words and stacked statements, regardless of shape
    if let Some(found) = DENY_REGEX.find(statement.as_str()) {
        return Verdict::Denied(format!(
            "statement contains a disallowed operation: {}",
            found.as_str().to_uppercase()
        ));
    }

    if STACKED_REGEX.is_match(statement.as_str()) {
        return Verdict::Denied("statement contains a disallowed operation: ;".to_string());
    }

    Verdict::Allowed
}

/// Skip leading whitespace, `--` line comments and `/* */` block comments
fn skip_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix("--") {
            text = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if text.starts_with("/*") {
            text = &text[block_comment_end(text.as_bytes(), 0)..];
        } else {
            return text;
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Leading run of word characters, if the text starts with a letter or `_`
fn first_word(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let end = text.find(|c: char| !is_word_char(c)).unwrap_or(text.len());
    Some(&text[..end])
}

/// The text with every comment blanked to spaces.
///
/// Byte offsets match the input, so a match found in the result can be used
/// to slice the original. Quoted and dollar-quoted sections are left as is.
pub fn blank_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_quoted(bytes, i, bytes[i]),
            b'$' => i = skip_dollar_quoted(text, i).unwrap_or(i + 1),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = text[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
                out[i..end].fill(b' ');
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = block_comment_end(bytes, i);
                out[i..end].fill(b' ');
                i = end;
            }
            _ => i += 1,
        }
    }

    // Comments start and end on ASCII bytes, so the result stays valid UTF-8
    String::from_utf8_lossy(&out).into_owned()
}

/// Find the first keyword of the body that follows a CTE list.
///
/// Walks the upper-cased statement at parenthesis depth zero, skipping
/// string literals, dollar-quoted bodies, quoted identifiers and comments. The body keyword is the
/// first bare word that directly follows a closed top-level group and is not
/// `AS` (which belongs to `name(cols) AS (...)`).
fn cte_body_keyword(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut depth: usize = 0;
    let mut after_group = false;
    let mut i = first_word(text).map(str::len).unwrap_or(0);

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '\'' | '"' => {
                i = skip_quoted(bytes, i, bytes[i]);
                if depth == 0 {
                    after_group = false;
                }
                continue;
            }
            '$' => {
                if let Some(end) = skip_dollar_quoted(text, i) {
                    i = end;
                    if depth == 0 {
                        after_group = false;
                    }
                    continue;
                }
            }
            '-' if bytes.get(i + 1) == Some(&b'-') => {
                i = text[i..].find('\n').map(|n| i + n + 1).unwrap_or(bytes.len());
                continue;
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                i = block_comment_end(bytes, i);
                continue;
            }
            '(' => depth += 1,
            ')' => {
                // An unbalanced close means the text is malformed
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    after_group = true;
                }
            }
            ',' if depth == 0 => after_group = false,
            _ if depth == 0 && (c.is_ascii_alphabetic() || c == '_') => {
                let word = first_word(&text[i..]).unwrap_or_default();
                if after_group && word != "AS" {
                    return Some(word.to_string());
                }
                after_group = false;
                i += word.len().max(1);
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Index just past a quoted section starting at `start`; doubled quotes escape
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Index just past a `$tag$ ... $tag$` section starting at `start`.
///
/// `None` when the `$` does not open one: a positional parameter such as
/// `$1`, or a `$` inside an identifier.
fn skip_dollar_quoted(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if start > 0 && is_word_char(bytes[start - 1] as char) {
        return None;
    }

    let rest = &text[start + 1..];
    let tag_len = rest.find('$')?;
    let tag = &rest[..tag_len];
    let opens_tag = tag
        .chars()
        .next()
        .map_or(true, |c| c.is_ascii_alphabetic() || c == '_');
    if !opens_tag || !tag.chars().all(is_word_char) {
        return None;
    }

    let body = start + tag_len + 2;
    let delimiter = &text[start..body];
    Some(
        text[body..]
            .find(delimiter)
            .map(|n| body + n + delimiter.len())
            .unwrap_or(bytes.len()),
    )
}

/// Index just past a block comment starting at `start`; comments nest
fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut depth: usize = 0;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth = depth.saturating_sub(1);
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(sql: &str) -> bool {
        !classify(sql).is_allowed()
    }

    #[test]
    fn test_empty_input_denied() {
        assert_eq!(classify(""), Verdict::Denied("empty query".to_string()));
        assert_eq!(classify("   \n\t"), Verdict::Denied("empty query".to_string()));
    }

    #[test]
    fn test_mutating_leading_keywords_denied() {
        let statements = [
            "INSERT INTO t VALUES (1)",
            "update t set a = 1",
            "  Delete FROM t",
            "\n\tDROP TABLE t",
            "create table t (a int)",
            "ALTER TABLE t ADD COLUMN b int",
            "truncate t",
            "GRANT SELECT ON t TO bob",
            "revoke all on t from bob",
        ];
        for sql in statements {
            assert!(denied(sql), "expected denial for {sql:?}");
        }
    }

    #[test]
    fn test_leading_keyword_reason() {
        assert_eq!(
            classify("VACUUM t"),
            Verdict::Denied("only read-only statements are permitted: VACUUM".to_string())
        );
        assert_eq!(
            classify("delete from t"),
            Verdict::Denied("only read-only statements are permitted: DELETE".to_string())
        );
    }

    #[test]
    fn test_read_statements_allowed() {
        let statements = [
            "SELECT 1",
            "  select * from users where id = 3",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "EXPLAIN SELECT * FROM users",
            "SHOW search_path",
            "DESCRIBE users",
            "SELECT 1;",
            "SELECT 1;  \n",
        ];
        for sql in statements {
            assert_eq!(classify(sql), Verdict::Allowed, "expected allow for {sql:?}");
        }
    }

    #[test]
    fn test_stacked_statements_denied() {
        assert!(denied("SELECT 1; DROP TABLE users;"));
        assert_eq!(
            classify("SELECT 1; SELECT 2"),
            Verdict::Denied("statement contains a disallowed operation: ;".to_string())
        );
    }

    #[test]
    fn test_cte_smuggled_mutation_denied() {
        assert_eq!(
            classify("WITH x AS (DELETE FROM t RETURNING *) SELECT * FROM x"),
            Verdict::Denied("statement contains a disallowed operation: DELETE".to_string())
        );
    }

    #[test]
    fn test_cte_with_mutating_body_denied() {
        assert_eq!(
            classify("WITH x AS (SELECT 1) INSERT INTO t SELECT * FROM x"),
            Verdict::Denied("only read-only statements are permitted: INSERT".to_string())
        );
    }

    #[test]
    fn test_cte_body_keyword() {
        let stmt = SqlStatement::new(
            "WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 5), \
             u AS MATERIALIZED (SELECT ')' AS p) SELECT * FROM t",
        );
        assert_eq!(stmt.leading_keyword(), Some("WITH"));
        assert_eq!(stmt.effective_keyword().as_deref(), Some("SELECT"));
    }

    #[test]
    fn test_select_into_and_set_config_denied() {
        assert_eq!(
            classify("SELECT * INTO stolen_users FROM users"),
            Verdict::Denied("statement contains a disallowed operation: INTO".to_string())
        );
        assert_eq!(
            classify("SELECT set_config('default_transaction_read_only', 'off', false)"),
            Verdict::Denied("statement contains a disallowed operation: SET_CONFIG".to_string())
        );
        assert!(denied("with t as (select 1 as a) select a into temp x from t"));
        assert_eq!(
            classify("SELECT current_setting('default_transaction_read_only')"),
            Verdict::Allowed
        );
        assert_eq!(classify("SELECT intorder, into_date FROM t"), Verdict::Allowed);
    }

    #[test]
    fn test_cte_body_skips_dollar_quotes() {
        let stmt = SqlStatement::new("WITH x AS (SELECT $$)$$) MERGE INTO t USING x ON true");
        assert_eq!(stmt.effective_keyword().as_deref(), Some("MERGE"));

        let tagged = SqlStatement::new("WITH x AS (SELECT $q$ ) SELECT $q$ AS s) SHOW x");
        assert_eq!(tagged.effective_keyword().as_deref(), Some("SHOW"));

        let param = SqlStatement::new("WITH x AS (SELECT $1) SELECT * FROM x");
        assert_eq!(param.effective_keyword().as_deref(), Some("SELECT"));
    }

    #[test]
    fn test_dollar_quoted_cte_body_denied() {
        assert_eq!(
            classify("WITH x AS (SELECT $$)$$) MERGE t USING x ON true"),
            Verdict::Denied("only read-only statements are permitted: MERGE".to_string())
        );
    }

    #[test]
    fn test_blank_comments_keeps_offsets() {
        let sql = "SELECT 'a -- b' /* c */ FROM t -- LIMIT 1";
        let blanked = blank_comments(sql);
        assert_eq!(blanked.len(), sql.len());
        assert_eq!(blanked.trim_end(), "SELECT 'a -- b'         FROM t");

        assert_eq!(blank_comments("SELECT 1 /* a /* b */ c */").trim_end(), "SELECT 1");
        assert_eq!(blank_comments("SELECT $$--$$ AS s"), "SELECT $$--$$ AS s");
        assert_eq!(blank_comments("SELECT 1 -- é\nFROM t"), "SELECT 1      \nFROM t");
    }

    #[test]
    fn test_nested_leading_comment_skipped() {
        let stmt = SqlStatement::new("/* outer /* inner */ DELETE */ SELECT 1");
        assert_eq!(stmt.leading_keyword(), Some("SELECT"));
    }

    #[test]
    fn test_cte_without_body_denied() {
        assert!(denied("WITH x AS (SELECT 1)"));
        assert!(denied("WITH x AS (SELECT 1))) SELECT 1"));
    }

    #[test]
    fn test_subquery_calling_mutation_denied() {
        assert!(denied("SELECT * FROM (SELECT 1) s WHERE EXISTS (SELECT 1 FROM t) AND 1 = (CALL p())"));
        assert!(denied("SELECT 1 FROM t WHERE a IN (SELECT 1) OR execute_me() AND EXECUTE"));
        assert!(denied("EXPLAIN ANALYZE DELETE FROM users"));
        assert!(denied("select 1 from t; copy t to '/tmp/x'"));
    }

    #[test]
    fn test_leading_comments_skipped() {
        assert_eq!(classify("-- report\nSELECT 1"), Verdict::Allowed);
        assert_eq!(classify("/* report */ SELECT 1"), Verdict::Allowed);
        assert!(denied("/* SELECT */ DELETE FROM t"));
    }

    #[test]
    fn test_comment_hiding_keyword_still_denied() {
        assert!(denied("SELECT 1 -- DROP"));
    }

    #[test]
    fn test_non_word_leading_token_denied() {
        assert_eq!(
            classify("(SELECT 1)"),
            Verdict::Denied("only read-only statements are permitted: (SELECT".to_string())
        );
    }

    // Known trade-off: the content scan does not understand literals.

    #[test]
    fn test_denied_word_in_literal_is_denied() {
        assert!(denied("SELECT 'drop' AS word"));
        assert!(denied(r#"SELECT "update" FROM counters"#));
    }

    #[test]
    fn test_denied_word_as_identifier_fragment_is_allowed() {
        assert_eq!(classify("SELECT update_count, created_at FROM t"), Verdict::Allowed);
        assert_eq!(
            classify(r#"SELECT "update_count" FROM "deleted_items""#),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_semicolon_in_literal_is_denied() {
        assert!(denied("SELECT ';x' AS s"));
    }

    #[test]
    fn test_executable_text_strips_one_terminator() {
        assert_eq!(SqlStatement::new("  SELECT 1 ;  ").executable_text(), "SELECT 1");
        assert_eq!(SqlStatement::new("SELECT 1").executable_text(), "SELECT 1");
    }

    #[test]
    fn test_statement_metadata() {
        let stmt = SqlStatement::new("  explain select 1 ");
        assert_eq!(stmt.as_str(), "  explain select 1 ");
        assert_eq!(stmt.normalized(), "EXPLAIN SELECT 1");
        assert_eq!(stmt.leading_keyword(), Some("EXPLAIN"));
    }
}

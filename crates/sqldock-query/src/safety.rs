//! Guardrails for destructive statements.
//!
//! UPDATE and DELETE must carry a WHERE clause; `WHERE 1=1` is the
//! documented escape hatch for intentionally touching every row. Comments
//! and string literals are stripped before the check so `-- WHERE` or
//! `'WHERE is my data'` never count.

use once_cell::sync::Lazy;
use regex::Regex;

use sqldock_commons::GatewayError;

static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bWHERE\b").unwrap());
static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").unwrap());
static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
// Doubled single quotes are the engine's escape for a quote inside a
// literal, so 'can''t' is one literal.
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());

/// Reject UPDATE/DELETE statements without a WHERE clause.
pub fn check_safety(sql: &str) -> Result<(), GatewayError> {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();

    for kind in ["UPDATE", "DELETE"] {
        if upper.starts_with(kind) && !has_where_clause(trimmed) {
            return Err(GatewayError::unsafe_query(kind));
        }
    }
    Ok(())
}

fn has_where_clause(sql: &str) -> bool {
    let stripped = LINE_COMMENT.replace_all(sql, "");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, "");
    let stripped = STRING_LITERAL.replace_all(&stripped, "''");
    WHERE_CLAUSE.is_match(&stripped.to_uppercase())
}

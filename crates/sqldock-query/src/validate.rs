//! Pre-execution request validation.
//!
//! Cheap checks only: presence, size, and a leading-keyword allow-list.
//! Real syntax validation is the engine's job; its diagnostics come back
//! through [`crate::translate`].

use sqldock_commons::GatewayError;

/// Statements must start with one of these. Everything else is rejected
/// before it reaches the engine.
const ALLOWED_KEYWORDS: [&str; 8] =
    ["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE"];

/// Validate a statement against the request rules: non-empty, within the
/// byte ceiling, and starting with an allowed keyword.
///
/// The size check runs against the raw byte length, not the trimmed one,
/// so the limit is exact and independent of whitespace games.
pub fn validate_query(sql: &str, max_bytes: usize) -> Result<(), GatewayError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::missing_field("sql"));
    }

    if sql.len() > max_bytes {
        return Err(GatewayError::query_too_large(sql.len(), max_bytes));
    }

    let upper = trimmed.to_uppercase();
    if !ALLOWED_KEYWORDS.iter().any(|kw| upper.starts_with(kw)) {
        return Err(GatewayError::invalid_sql(
            "Query must start with a valid SQL keyword (SELECT, INSERT, UPDATE, DELETE, CREATE, \
             DROP, ALTER, TRUNCATE)",
        ));
    }

    Ok(())
}

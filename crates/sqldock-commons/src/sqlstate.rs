//! Translation of engine-native SQLSTATE diagnostics to the external
//! error vocabulary.
//!
//! The table is loaded once at first use and never mutated. Unrecognized
//! codes map to `INTERNAL_ERROR` with the native code preserved in the
//! detail field so no diagnostic is silently dropped.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::{ErrorCode, GatewayError};

static SQLSTATE_MAP: Lazy<HashMap<&'static str, ErrorCode>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Syntax and reference errors
    m.insert("42601", ErrorCode::InvalidSql); // syntax_error
    m.insert("42703", ErrorCode::InvalidSql); // undefined_column
    m.insert("42P01", ErrorCode::InvalidSql); // undefined_table
    m.insert("42P02", ErrorCode::InvalidSql); // undefined_parameter
    m.insert("42883", ErrorCode::InvalidSql); // undefined_function
    m.insert("42804", ErrorCode::InvalidSql); // datatype_mismatch

    // Cancellation
    m.insert("57014", ErrorCode::QueryTimeout); // query_canceled

    // Resource exhaustion
    m.insert("53000", ErrorCode::DatabaseUnavailable); // insufficient_resources
    m.insert("53100", ErrorCode::DatabaseUnavailable); // disk_full
    m.insert("53200", ErrorCode::DatabaseUnavailable); // out_of_memory
    m.insert("53300", ErrorCode::DatabaseUnavailable); // too_many_connections
    m.insert("53400", ErrorCode::DatabaseUnavailable); // configuration_limit_exceeded

    // Connection failures
    m.insert("08000", ErrorCode::DatabaseUnavailable); // connection_exception
    m.insert("08001", ErrorCode::DatabaseUnavailable); // sqlclient_unable_to_establish_sqlconnection
    m.insert("08003", ErrorCode::DatabaseUnavailable); // connection_does_not_exist
    m.insert("08004", ErrorCode::DatabaseUnavailable); // sqlserver_rejected_establishment_of_sqlconnection
    m.insert("08006", ErrorCode::DatabaseUnavailable); // connection_failure

    // Program limits
    m.insert("54000", ErrorCode::DocumentTooLarge); // program_limit_exceeded
    m.insert("54001", ErrorCode::DocumentTooLarge); // statement_too_complex

    m
});

/// Look up the external code for a 5-character SQLSTATE. `None` means the
/// code is unrecognized and the caller should fall back to `InternalError`.
pub fn lookup(sqlstate: &str) -> Option<ErrorCode> {
    SQLSTATE_MAP.get(sqlstate).copied()
}

/// Build a [`GatewayError`] from the fields of an engine diagnostic.
///
/// `message`, `hint` and `position` are folded into the detail string;
/// the user-facing message depends on the mapped code.
pub fn translate_diagnostic(
    sqlstate: &str,
    message: &str,
    db_detail: Option<&str>,
    hint: Option<&str>,
    position: Option<u32>,
) -> GatewayError {
    let code = lookup(sqlstate).unwrap_or(ErrorCode::InternalError);

    let user_message = match code {
        ErrorCode::InvalidSql => "Invalid SQL syntax".to_string(),
        ErrorCode::QueryTimeout => "Query execution timeout".to_string(),
        ErrorCode::DatabaseUnavailable => "Database is unavailable".to_string(),
        ErrorCode::DocumentTooLarge => "Document too large".to_string(),
        _ if !message.is_empty() => message.to_string(),
        _ => "An error occurred".to_string(),
    };

    let mut detail = format!("engine error [{}]: {}", sqlstate, message);
    if let Some(d) = db_detail {
        detail.push_str(&format!(" | Detail: {}", d));
    }
    if let Some(h) = hint {
        detail.push_str(&format!(" | Hint: {}", h));
    }
    if let Some(p) = position {
        detail.push_str(&format!(" | Position: {}", p));
    }

    GatewayError::new(code, user_message).with_detail(detail)
}

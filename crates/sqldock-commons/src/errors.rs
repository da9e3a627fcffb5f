//! External error vocabulary for SQLDock.
//!
//! Every failure that crosses the HTTP boundary is expressed as a
//! [`GatewayError`] carrying one code from the closed [`ErrorCode`]
//! enumeration. Engine-native diagnostics never leave the process verbatim;
//! they are preserved in the `detail` field instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of error codes exposed over the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSql,
    MissingRequiredField,
    UnsafeQuery,
    QueryTimeout,
    QueryTooLarge,
    ResultTooLarge,
    DocumentTooLarge,
    InternalError,
    ServiceUnavailable,
    DatabaseUnavailable,
}

impl ErrorCode {
    /// Wire representation, e.g. `INVALID_SQL`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSql => "INVALID_SQL",
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::UnsafeQuery => "UNSAFE_QUERY",
            ErrorCode::QueryTimeout => "QUERY_TIMEOUT",
            ErrorCode::QueryTooLarge => "QUERY_TOO_LARGE",
            ErrorCode::ResultTooLarge => "RESULT_TOO_LARGE",
            ErrorCode::DocumentTooLarge => "DOCUMENT_TOO_LARGE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
        }
    }

    /// HTTP status associated with this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidSql | ErrorCode::MissingRequiredField | ErrorCode::UnsafeQuery => 400,
            ErrorCode::QueryTimeout => 408,
            ErrorCode::QueryTooLarge | ErrorCode::ResultTooLarge | ErrorCode::DocumentTooLarge => {
                413
            }
            ErrorCode::InternalError => 500,
            ErrorCode::ServiceUnavailable | ErrorCode::DatabaseUnavailable => 503,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translated error as it crosses the HTTP boundary.
///
/// `detail` optionally carries engine-native context (message, hint,
/// SQLSTATE) for debugging; `message` stays user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: Option<String>,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingRequiredField, format!("Missing required field: {}", field))
            .with_detail(format!("The request must include a non-empty '{}' field", field))
    }

    pub fn invalid_sql(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSql, "Invalid SQL syntax").with_detail(detail)
    }

    pub fn unsafe_query(statement_kind: &str) -> Self {
        Self::new(
            ErrorCode::UnsafeQuery,
            format!("Unsafe query: {} without WHERE clause", statement_kind),
        )
        .with_detail(format!(
            "{} statements must include a WHERE clause. Use 'WHERE 1=1' to affect all rows explicitly",
            statement_kind
        ))
    }

    pub fn query_too_large(actual: usize, max: usize) -> Self {
        Self::new(ErrorCode::QueryTooLarge, "Query too large").with_detail(format!(
            "Query size ({} bytes) exceeds the maximum allowed size ({} bytes)",
            actual, max
        ))
    }

    pub fn result_too_large(max: usize) -> Self {
        Self::new(ErrorCode::ResultTooLarge, "Result set too large")
            .with_detail(format!("Query returned more than the maximum allowed {} rows", max))
    }

    pub fn query_timeout(limit_secs: u64) -> Self {
        Self::new(ErrorCode::QueryTimeout, "Query execution timeout").with_detail(format!(
            "Query exceeded the maximum execution time of {} seconds",
            limit_secs
        ))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, "An internal error occurred").with_detail(detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, "Service unavailable").with_detail(detail)
    }

    pub fn database_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseUnavailable, "Database is unavailable").with_detail(detail)
    }
}

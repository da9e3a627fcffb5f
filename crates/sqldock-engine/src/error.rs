//! Engine-side error types.

use thiserror::Error;

use sqldock_commons::GatewayError;

/// Errors raised while managing the embedded engine and its connections.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("bundle extraction failed: {0}")]
    Extraction(String),

    #[error("data directory initialization failed: {0}")]
    Initialization(String),

    #[error("engine failed to become ready within {0} seconds")]
    StartupTimeout(u64),

    #[error("engine process exited unexpectedly")]
    Crashed,

    #[error("engine is not ready: {0}")]
    NotReady(String),

    #[error("connection pool exhausted after waiting {0} ms")]
    PoolExhausted(u64),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("engine connection error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("supervisor already started")]
    AlreadyStarted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::PoolExhausted(waited_ms) => {
                GatewayError::service_unavailable(format!(
                    "connection pool exhausted: no connection became free within {} ms",
                    waited_ms
                ))
            }
            EngineError::PoolClosed => {
                GatewayError::service_unavailable("connection pool is closed")
            }
            EngineError::Crashed => {
                GatewayError::database_unavailable("engine process exited unexpectedly")
            }
            EngineError::NotReady(reason) => GatewayError::database_unavailable(reason.clone()),
            EngineError::Connection(_) => GatewayError::database_unavailable(err.to_string()),
            _ => GatewayError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqldock_commons::ErrorCode;

    #[test]
    fn pool_exhaustion_surfaces_as_service_unavailable() {
        let gw: GatewayError = EngineError::PoolExhausted(5000).into();
        assert_eq!(gw.code, ErrorCode::ServiceUnavailable);
        assert!(gw.detail.unwrap().contains("pool exhausted"));
    }

    #[test]
    fn crash_and_not_ready_surface_as_database_unavailable() {
        let gw: GatewayError = EngineError::Crashed.into();
        assert_eq!(gw.code, ErrorCode::DatabaseUnavailable);

        let gw: GatewayError = EngineError::NotReady("still starting".into()).into();
        assert_eq!(gw.code, ErrorCode::DatabaseUnavailable);
        assert_eq!(gw.detail.as_deref(), Some("still starting"));
    }

    #[test]
    fn supervisor_failures_surface_as_internal() {
        let gw: GatewayError = EngineError::StartupTimeout(30).into();
        assert_eq!(gw.code, ErrorCode::InternalError);
    }
}

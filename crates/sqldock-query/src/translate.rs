//! Mapping of driver errors onto the external vocabulary.
//!
//! Server diagnostics carry a SQLSTATE and go through the shared
//! translation table. Client-side failures (broken socket, protocol
//! error) have no SQLSTATE and surface as DATABASE_UNAVAILABLE, since
//! they all mean the engine stopped talking to us.

use tokio_postgres::error::ErrorPosition;

use sqldock_commons::{sqlstate, GatewayError};

/// Translate a driver error into a [`GatewayError`].
pub fn translate_db_error(err: &tokio_postgres::Error) -> GatewayError {
    if let Some(db) = err.as_db_error() {
        let position = db.position().map(|p| match p {
            ErrorPosition::Original(pos) => *pos,
            ErrorPosition::Internal { position, .. } => *position,
        });
        return sqlstate::translate_diagnostic(
            db.code().code(),
            db.message(),
            db.detail(),
            db.hint(),
            position,
        );
    }

    if err.is_closed() {
        return GatewayError::database_unavailable("connection to the engine was closed");
    }

    GatewayError::database_unavailable(err.to_string())
}

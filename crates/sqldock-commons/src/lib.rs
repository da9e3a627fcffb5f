//! sqldock-commons
//!
//! Shared types used across all SQLDock crates: the external error
//! vocabulary, the SQLSTATE translation table, and the JSON row value model.

pub mod errors;
pub mod sqlstate;
pub mod value;

pub use errors::{ErrorCode, GatewayError};
pub use value::{Row, SqlValue};

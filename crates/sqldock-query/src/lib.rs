//! sqldock-query
//!
//! The query gateway: everything between an authenticated-by-locality HTTP
//! request and the engine socket. Validates and safety-checks incoming SQL,
//! executes it over a pooled connection under a deadline, converts rows to
//! the JSON value model, and translates every engine diagnostic into the
//! closed external error vocabulary.

pub mod convert;
pub mod gateway;
pub mod safety;
pub mod translate;
pub mod validate;

pub use gateway::{ExecutionOutcome, QueryExecutor, QueryGateway};
pub use safety::check_safety;
pub use translate::translate_db_error;
pub use validate::validate_query;

//! sqldock-api
//!
//! The HTTP surface of SQLDock: the `/v1/query` endpoint, the healthcheck,
//! and the JSON request/response models. Handlers depend on the
//! [`sqldock_query::QueryExecutor`] seam, never on the engine directly.

pub mod handlers;
pub mod models;
pub mod routes;

pub use models::{ErrorBody, QueryRequest, QueryResponse};

//! sqldock-engine
//!
//! Owns the embedded PostgreSQL process end to end: unpacking the bundled
//! binaries, driving the process through its lifecycle, and maintaining the
//! bounded connection pool used by the query gateway.

pub mod bundle;
pub mod error;
pub mod pool;
pub mod supervisor;

pub use bundle::{BundleExtractor, EngineLayout};
pub use error::EngineError;
pub use pool::{pg_pool, ConnectionPool, PgConn, PgPool, PoolGuard};
pub use supervisor::{EngineSupervisor, SupervisorState};

//! The query gateway: the single path from HTTP request to engine socket.
//!
//! Order of operations is fixed: validate, safety-check, confirm the
//! engine is serving, borrow a connection, execute under the deadline.
//! A request that fails validation never touches the pool or the engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::warn;
use tokio_postgres::Client;

use sqldock_commons::{ErrorCode, GatewayError, Row};
use sqldock_configs::{PoolSettings, QuerySettings};
use sqldock_engine::{EngineError, EngineSupervisor, PgPool, SupervisorState};

use crate::convert::convert_row;
use crate::safety::check_safety;
use crate::translate::translate_db_error;
use crate::validate::validate_query;

/// Result of one executed statement.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub elapsed: Duration,
}

/// Seam between the HTTP layer and query execution. Handlers depend on
/// this trait, which keeps them testable with a stub executor.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ExecutionOutcome, GatewayError>;
}

/// Production executor backed by the supervisor and connection pool.
pub struct QueryGateway {
    supervisor: Arc<EngineSupervisor>,
    pool: Arc<PgPool>,
    query: QuerySettings,
    acquire_timeout: Duration,
}

impl QueryGateway {
    pub fn new(
        supervisor: Arc<EngineSupervisor>,
        pool: Arc<PgPool>,
        query: QuerySettings,
        pool_settings: &PoolSettings,
    ) -> Self {
        Self {
            supervisor,
            pool,
            query,
            acquire_timeout: Duration::from_millis(pool_settings.acquire_timeout_ms),
        }
    }

    /// Fail fast while the engine is anything but Ready, so requests
    /// don't stack up against a socket that cannot answer.
    fn ensure_ready(&self) -> Result<(), GatewayError> {
        match self.supervisor.state() {
            SupervisorState::Ready => Ok(()),
            SupervisorState::Crashed => Err(EngineError::Crashed.into()),
            other => Err(EngineError::NotReady(format!(
                "engine is not ready (state: {})",
                other.as_str()
            ))
            .into()),
        }
    }
}

#[async_trait]
impl QueryExecutor for QueryGateway {
    async fn execute(&self, sql: &str) -> Result<ExecutionOutcome, GatewayError> {
        validate_query(sql, self.query.max_query_bytes)?;
        check_safety(sql)?;
        self.ensure_ready()?;

        let mut conn = self.pool.acquire(self.acquire_timeout).await.map_err(GatewayError::from)?;

        let started = Instant::now();
        let deadline = Duration::from_secs(self.query.execution_timeout_secs);
        let result = tokio::time::timeout(
            deadline,
            run_statement(conn.client(), sql, self.query.max_result_rows),
        )
        .await;

        match result {
            Ok(Ok(rows)) => {
                Ok(ExecutionOutcome { row_count: rows.len(), rows, elapsed: started.elapsed() })
            }
            Ok(Err(err)) => {
                // A dead engine poisons the connection; everything else
                // leaves it reusable.
                if err.code == ErrorCode::DatabaseUnavailable {
                    conn.discard();
                }
                Err(err)
            }
            Err(_) => {
                // Deadline fired while the statement may still be running
                // server-side. Keep the connection only if it answers a
                // probe promptly.
                if !conn.liveness_check(Duration::from_secs(1)).await {
                    warn!("Connection unresponsive after query timeout, discarding");
                    conn.discard();
                }
                Err(GatewayError::query_timeout(self.query.execution_timeout_secs))
            }
        }
    }
}

/// Execute one statement and materialize its rows. A statement that
/// returns no rows (INSERT, DDL) yields an empty set and row count zero.
async fn run_statement(
    client: &Client,
    sql: &str,
    max_rows: usize,
) -> Result<Vec<Row>, GatewayError> {
    let pg_rows = client.query(sql, &[]).await.map_err(|e| translate_db_error(&e))?;

    // Over-limit results fail outright; nothing is ever truncated.
    if pg_rows.len() > max_rows {
        return Err(GatewayError::result_too_large(max_rows));
    }

    pg_rows.iter().map(convert_row).collect()
}

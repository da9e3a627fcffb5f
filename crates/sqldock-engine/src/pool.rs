//! Bounded connection pool in front of the running engine.
//!
//! The pool opens exactly N connections once the supervisor reports Ready
//! and hands them out one-per-query via a borrow/return guard. A broken
//! connection is discarded on return and lazily reopened on a later
//! acquire, so the pool never silently shrinks below capacity.
//!
//! The pool is generic over its connection type so its semantics are
//! testable without a live engine; [`PgPool`] is the production instance.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::error::EngineError;

type ConnFuture<C> = BoxFuture<'static, Result<C, EngineError>>;
type Factory<C> = Box<dyn Fn() -> ConnFuture<C> + Send + Sync>;
type HealthCheck<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

/// Fixed-capacity pool of reusable connections.
pub struct ConnectionPool<C: Send + 'static> {
    capacity: usize,
    semaphore: Semaphore,
    idle: Mutex<VecDeque<C>>,
    factory: Factory<C>,
    healthy: HealthCheck<C>,
    closed: AtomicBool,
}

impl<C: Send + 'static> ConnectionPool<C> {
    pub fn new(capacity: usize, factory: Factory<C>, healthy: HealthCheck<C>) -> Self {
        Self {
            capacity,
            semaphore: Semaphore::new(capacity),
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            factory,
            healthy,
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eagerly open all N connections. Called once after the engine
    /// reports Ready; any failure aborts startup.
    pub async fn populate(&self) -> Result<(), EngineError> {
        for _ in 0..self.capacity {
            let conn = (self.factory)().await?;
            self.idle.lock().push_back(conn);
        }
        Ok(())
    }

    /// Borrow a connection, waiting up to `wait` for a slot to free.
    ///
    /// An idle connection that fails the health check is dropped and
    /// replaced by a freshly opened one — this is where a discarded
    /// connection is lazily reopened.
    pub async fn acquire(&self, wait: Duration) -> Result<PoolGuard<'_, C>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::PoolClosed);
        }

        let permit = tokio::time::timeout(wait, self.semaphore.acquire())
            .await
            .map_err(|_| EngineError::PoolExhausted(wait.as_millis() as u64))?
            .map_err(|_| EngineError::PoolClosed)?;

        let conn = loop {
            let candidate = self.idle.lock().pop_front();
            match candidate {
                Some(c) if (self.healthy)(&c) => break c,
                Some(_) => {
                    debug!("Dropping broken idle connection");
                    continue;
                }
                None => break (self.factory)().await?,
            }
        };

        Ok(PoolGuard { pool: self, conn: Some(conn), _permit: permit, discard: false })
    }

    /// Close the pool and drop all idle connections. Idempotent; waiters
    /// and future acquires observe `PoolClosed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.semaphore.close();
            self.idle.lock().clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Exclusive borrow of one pooled connection for the duration of one
/// statement. Dropping the guard returns the connection unless it was
/// discarded or fails the health check.
pub struct PoolGuard<'a, C: Send + 'static> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C>,
    _permit: SemaphorePermit<'a>,
    discard: bool,
}

impl<C: Send + 'static> std::fmt::Debug for PoolGuard<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}

impl<C: Send + 'static> PoolGuard<'_, C> {
    /// Mark the connection as poisoned; it will be dropped instead of
    /// returned to the pool.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<C: Send + 'static> Deref for PoolGuard<'_, C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<C: Send + 'static> DerefMut for PoolGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<C: Send + 'static> Drop for PoolGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.discard && !self.pool.is_closed() && (self.pool.healthy)(&conn) {
                self.pool.idle.lock().push_back(conn);
            }
        }
    }
}

/// One live connection to the engine. The driver task owns the socket
/// I/O; the client is handed to queries.
pub struct PgConn {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConn {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_healthy(&self) -> bool {
        !self.client.is_closed()
    }

    /// Cheap probe used before returning a possibly-poisoned connection
    /// to the pool (e.g. after an execution deadline fired).
    pub async fn liveness_check(&self, wait: Duration) -> bool {
        matches!(
            tokio::time::timeout(wait, self.client.simple_query("SELECT 1")).await,
            Ok(Ok(_))
        )
    }
}

impl Drop for PgConn {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Production pool type.
pub type PgPool = ConnectionPool<PgConn>;

/// Connection string for the loopback engine. `statement_timeout` gives a
/// server-side backstop to the gateway's own execution deadline.
pub fn connection_string(port: u16, statement_timeout_ms: u64) -> String {
    format!(
        "host=127.0.0.1 port={} user=postgres dbname=postgres connect_timeout=5 \
         options='-c statement_timeout={}'",
        port, statement_timeout_ms
    )
}

/// Build the production pool against the engine on `port`. Connections
/// are not opened until [`ConnectionPool::populate`] runs.
pub fn pg_pool(capacity: usize, port: u16, statement_timeout_ms: u64) -> PgPool {
    let conn_str = connection_string(port, statement_timeout_ms);
    ConnectionPool::new(
        capacity,
        Box::new(move || {
            let conn_str = conn_str.clone();
            Box::pin(async move {
                let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("Engine connection terminated: {}", e);
                    }
                });
                Ok(PgConn { client, driver })
            })
        }),
        Box::new(PgConn::is_healthy),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    struct TestConn {
        id: usize,
        broken: Arc<AtomicBool>,
    }

    fn test_pool(capacity: usize) -> (Arc<ConnectionPool<TestConn>>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let opened_in_factory = opened.clone();
        let pool = ConnectionPool::new(
            capacity,
            Box::new(move || {
                let opened = opened_in_factory.clone();
                Box::pin(async move {
                    let id = opened.fetch_add(1, Ordering::SeqCst);
                    Ok(TestConn { id, broken: Arc::new(AtomicBool::new(false)) })
                })
            }),
            Box::new(|c: &TestConn| !c.broken.load(Ordering::SeqCst)),
        );
        (Arc::new(pool), opened)
    }

    #[tokio::test]
    async fn populate_opens_exactly_capacity_connections() {
        let (pool, opened) = test_pool(2);
        pool.populate().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_len(), 2);
    }

    #[tokio::test]
    async fn acquire_times_out_when_exhausted() {
        let (pool, _) = test_pool(2);
        pool.populate().await.unwrap();

        let g1 = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let g2 = pool.acquire(Duration::from_millis(100)).await.unwrap();

        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, EngineError::PoolExhausted(50)));

        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn third_acquire_blocks_until_a_release() {
        let (pool, _) = test_pool(2);
        pool.populate().await.unwrap();

        let g1 = pool.acquire(Duration::from_millis(100)).await.unwrap();
        let _g2 = pool.acquire(Duration::from_millis(100)).await.unwrap();

        let pool_for_task = pool.clone();
        let start = Instant::now();
        let waiter = tokio::spawn(async move {
            let _g3 = pool_for_task.acquire(Duration::from_secs(2)).await.unwrap();
            start.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(g1);

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(90), "third acquire returned before a release");
    }

    #[tokio::test]
    async fn broken_connection_is_replaced_lazily() {
        let (pool, opened) = test_pool(1);
        pool.populate().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        {
            let guard = pool.acquire(Duration::from_millis(100)).await.unwrap();
            guard.broken.store(true, Ordering::SeqCst);
        }
        // Broken connection was not returned to the idle queue.
        assert_eq!(pool.idle_len(), 0);

        // Next acquire reopens; capacity is restored, not shrunk.
        let guard = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(guard.id, 1);
    }

    #[tokio::test]
    async fn explicit_discard_drops_the_connection() {
        let (pool, opened) = test_pool(1);
        pool.populate().await.unwrap();

        {
            let mut guard = pool.acquire(Duration::from_millis(100)).await.unwrap();
            guard.discard();
        }
        assert_eq!(pool.idle_len(), 0);

        let _ = pool.acquire(Duration::from_millis(100)).await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_new_acquires() {
        let (pool, _) = test_pool(2);
        pool.populate().await.unwrap();

        pool.close();
        pool.close();

        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, EngineError::PoolClosed));
        assert_eq!(pool.idle_len(), 0);
    }

    #[tokio::test]
    async fn factory_failure_propagates_from_acquire() {
        let pool: ConnectionPool<TestConn> = ConnectionPool::new(
            1,
            Box::new(|| {
                Box::pin(async { Err(EngineError::NotReady("engine not started".into())) })
            }),
            Box::new(|_| true),
        );

        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotReady(_)));
    }

    #[test]
    fn connection_string_targets_loopback() {
        let s = connection_string(5433, 5000);
        assert!(s.contains("host=127.0.0.1"));
        assert!(s.contains("port=5433"));
        assert!(s.contains("statement_timeout=5000"));
    }
}

//! Server lifecycle management helpers.
//!
//! This module encapsulates the heavy lifting so `main.rs` stays a thin
//! orchestrator: bringing up the engine and connection pool, wiring the
//! HTTP server, and coordinating graceful shutdown in reverse order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use log::{error, info, warn};

use sqldock_api::routes;
use sqldock_configs::ServerConfig;
use sqldock_engine::{pg_pool, EngineSupervisor, PgPool, SupervisorState};
use sqldock_query::{QueryExecutor, QueryGateway};

use crate::middleware;

/// Aggregated application components shared across the HTTP server and
/// shutdown handling.
pub struct ApplicationComponents {
    pub supervisor: Arc<EngineSupervisor>,
    pub pool: Arc<PgPool>,
    pub executor: Arc<dyn QueryExecutor>,
}

/// Bring up the engine and open the connection pool. Fails hard on any
/// error; the server never serves queries against a half-started engine.
pub async fn bootstrap(config: &ServerConfig) -> Result<ApplicationComponents> {
    let phase_start = Instant::now();
    let supervisor = Arc::new(EngineSupervisor::new(config.engine.clone()));
    supervisor
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start embedded engine: {}", e))?;
    info!("Engine ready ({:.2}s)", phase_start.elapsed().as_secs_f64());

    let phase_start = Instant::now();
    let statement_timeout_ms = config.query.execution_timeout_secs * 1000;
    let pool = Arc::new(pg_pool(
        config.pool.max_connections,
        config.engine.port,
        statement_timeout_ms,
    ));
    if let Err(e) = pool.populate().await {
        // Engine is already up; take it back down before bailing.
        if let Err(stop_err) = supervisor.stop().await {
            error!("Failed to stop engine during bootstrap rollback: {}", stop_err);
        }
        return Err(anyhow::anyhow!("Failed to open connection pool: {}", e));
    }
    info!(
        "Connection pool ready: {} connections ({:.2}ms)",
        pool.capacity(),
        phase_start.elapsed().as_secs_f64() * 1000.0
    );

    let executor: Arc<dyn QueryExecutor> = Arc::new(QueryGateway::new(
        supervisor.clone(),
        pool.clone(),
        config.query.clone(),
        &config.pool,
    ));

    Ok(ApplicationComponents { supervisor, pool, executor })
}

/// Start the HTTP server and manage graceful shutdown: stop accepting
/// requests, close the pool, then stop the engine.
pub async fn run(config: &ServerConfig, components: ApplicationComponents) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", bind_addr);
    if config.server.host != "127.0.0.1" && config.server.host != "localhost" {
        warn!(
            "Binding to {} exposes the API beyond this machine; there is no authentication layer",
            config.server.host
        );
    }

    // Surface a crash the moment it happens instead of waiting for the
    // next query to fail.
    let mut state_rx = components.supervisor.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            if *state_rx.borrow() == SupervisorState::Crashed {
                error!(
                    "Engine process crashed; queries will fail with DATABASE_UNAVAILABLE until \
                     the server is restarted"
                );
                break;
            }
        }
    });

    let executor = components.executor.clone();
    let supervisor = components.supervisor.clone();
    let cors_settings = config.cors.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::request_logger())
            .wrap(middleware::build_cors_from_config(&cors_settings))
            .app_data(web::Data::from(executor.clone()))
            .app_data(web::Data::from(supervisor.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .workers(if config.server.workers == 0 { num_cpus::get() } else { config.server.workers })
    .keep_alive(Duration::from_secs(config.server.keepalive_secs))
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            if let Err(e) = result {
                error!("Server task failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");

            // Teardown mirrors startup in reverse.
            server_handle.stop(true).await;
            components.pool.close();
            if let Err(e) = components.supervisor.stop().await {
                error!("Failed to stop engine cleanly: {}", e);
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

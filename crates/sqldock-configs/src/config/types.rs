use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Main server configuration, loaded from `config.toml`.
///
/// Every section has sensible defaults so the binary runs without a config
/// file at all.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub cors: CorsSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind host. Loopback by default; set to 0.0.0.0 (or export
    /// SQLDOCK_BIND_HOST) to allow LAN access.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Actix worker count; 0 means one per CPU.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            workers: 0,
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

/// Embedded engine process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Data directory holding the initialized catalog. Survives restarts.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Port the engine listens on (loopback only).
    #[serde(default = "default_engine_port")]
    pub port: u16,
    /// Readiness-probe ceiling.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    /// One-time data-directory initialization timeout.
    #[serde(default = "default_initdb_timeout_secs")]
    pub initdb_timeout_secs: u64,
    /// Grace period for a clean stop before forceful termination.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: default_engine_port(),
            startup_timeout_secs: default_startup_timeout_secs(),
            initdb_timeout_secs: default_initdb_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Fixed pool capacity; connections are opened once the engine is ready.
    #[serde(default = "default_pool_capacity")]
    pub max_connections: usize,
    /// How long a query may wait for a free connection.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_pool_capacity(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

/// Query gateway limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Byte ceiling for a single SQL statement.
    #[serde(default = "default_max_query_bytes")]
    pub max_query_bytes: usize,
    /// Row ceiling for a result set. Exceeding it fails the query; results
    /// are never silently truncated.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
    /// Execution deadline per statement, measured from dispatch.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_query_bytes: default_max_query_bytes(),
            max_result_rows: default_max_result_rows(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Per-target level overrides, e.g. `"sqldock_engine" = "debug"`.
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}

/// CORS policy for the HTTP API. Empty origins list allows any origin,
/// which is the right default for a localhost developer tool.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsSettings {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

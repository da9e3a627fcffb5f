//! Default values for `config.toml` fields.

pub fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_http_port() -> u16 {
    5173
}

pub fn default_keepalive_secs() -> u64 {
    30
}

pub fn default_data_dir() -> String {
    "./sqldock-data".to_string()
}

// 5433 avoids colliding with a system PostgreSQL on 5432.
pub fn default_engine_port() -> u16 {
    5433
}

pub fn default_startup_timeout_secs() -> u64 {
    30
}

pub fn default_initdb_timeout_secs() -> u64 {
    60
}

pub fn default_shutdown_grace_secs() -> u64 {
    10
}

pub fn default_pool_capacity() -> usize {
    2
}

pub fn default_acquire_timeout_ms() -> u64 {
    5000
}

pub fn default_max_query_bytes() -> usize {
    10 * 1024
}

pub fn default_max_result_rows() -> usize {
    1000
}

pub fn default_execution_timeout_secs() -> u64 {
    5
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_true() -> bool {
    true
}

use std::fs;
use std::path::Path;

use super::types::ServerConfig;

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied separately via
    /// [`ServerConfig::apply_env_overrides`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    /// SQLDock is a developer tool; running without a config file must work.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SQLDOCK_BIND_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(dir) = std::env::var("SQLDOCK_DATA_DIR") {
            if !dir.is_empty() {
                self.engine.data_dir = dir;
            }
        }
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }
        if self.engine.port == 0 {
            return Err(anyhow::anyhow!("Engine port cannot be 0"));
        }
        if self.server.port == self.engine.port {
            return Err(anyhow::anyhow!(
                "Server and engine cannot share port {}",
                self.server.port
            ));
        }

        if self.pool.max_connections == 0 {
            return Err(anyhow::anyhow!("Pool capacity must be at least 1"));
        }

        if self.query.max_query_bytes == 0 || self.query.max_result_rows == 0 {
            return Err(anyhow::anyhow!("Query limits must be non-zero"));
        }
        if self.query.execution_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Execution timeout must be at least 1 second"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }
        for (target, level) in &self.logging.targets {
            if !valid_levels.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'",
                    level,
                    target
                ));
            }
        }

        let valid_formats = ["compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().expect("default config must validate");
        assert_eq!(config.server.port, 5173);
        assert_eq!(config.engine.port, 5433);
        assert_eq!(config.pool.max_connections, 2);
        assert_eq!(config.query.max_query_bytes, 10 * 1024);
        assert_eq!(config.query.max_result_rows, 1000);
        assert_eq!(config.query.execution_timeout_secs, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nport = 6543\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.engine.port, 6543);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections fall back to defaults
        assert_eq!(config.server.port, 5173);
        assert_eq!(config.pool.max_connections, 2);
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let config = ServerConfig::load_or_default("/nonexistent/sqldock.toml").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn rejects_conflicting_ports() {
        let mut config = ServerConfig::default();
        config.engine.port = config.server.port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level_and_format() {
        let mut config = ServerConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.logging.format = "yaml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_pool_capacity() {
        let mut config = ServerConfig::default();
        config.pool.max_connections = 0;
        assert!(config.validate().is_err());
    }
}

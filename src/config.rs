//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Config file read from the working directory when present
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment prefix, e.g. `TRAFFIC__SERVER__PORT=8080`
const ENV_PREFIX: &str = "TRAFFIC";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub live: LiveConfig,
    pub query: QueryConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. `:memory:` keeps everything in a single in-process connection.
    pub path: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Seconds between heartbeat frames on each live stream
    pub heartbeat_secs: u64,
    /// Frames queued per subscriber before new frames are dropped for it
    pub subscriber_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Base URL the dashboard page uses to reach the API
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Layer defaults, the optional config file, then `TRAFFIC__*` environment variables
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("database.path", "data/events.db")?
            .set_default("database.max_connections", 5)?
            .set_default("live.heartbeat_secs", 15)?
            .set_default("live.subscriber_buffer", 64)?
            .set_default("query.default_limit", 50)?
            .set_default("query.max_limit", 1000)?
            .set_default("dashboard.api_base", "http://localhost:4000")?
            .set_default("logging.level", "info")?
            .add_source(config::File::from(config_path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.database.path.is_empty() {
            anyhow::bail!("Database path cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }

        if self.live.heartbeat_secs == 0 {
            anyhow::bail!("live.heartbeat_secs must be at least 1");
        }
        if self.live.subscriber_buffer == 0 {
            anyhow::bail!("live.subscriber_buffer must be at least 1");
        }

        if self.query.default_limit <= 0 || self.query.max_limit <= 0 {
            anyhow::bail!("Query limits must be positive");
        }
        if self.query.default_limit > self.query.max_limit {
            anyhow::bail!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                self.query.default_limit,
                self.query.max_limit
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 4000,
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
            max_connections: 1,
        },
        live: LiveConfig {
            heartbeat_secs: 3600,
            subscriber_buffer: 16,
        },
        query: QueryConfig {
            default_limit: 50,
            max_limit: 1000,
        },
        dashboard: DashboardConfig {
            api_base: "http://localhost:4000".to_string(),
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

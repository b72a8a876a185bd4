//! Configuration for the server and agent binaries.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

use thiserror::Error;

use crate::agent::{default_routes, parse_routes, RouteTarget};

/// Fallback report cadence when the stored setting is absent.
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("UPWATCH_AGENT_TOKEN is not set")]
    MissingToken,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "upwatch.db")
    pub db_path: String,
    /// Cadence of the check scheduler in seconds (default: 60)
    pub check_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "upwatch.db".to_string(),
            check_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `UPWATCH_DB_PATH`: Database file path (default: "upwatch.db")
    /// - `UPWATCH_CHECK_INTERVAL_SECS`: Scheduler cadence (default: 60)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("UPWATCH_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("UPWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(interval_str) = env::var("UPWATCH_CHECK_INTERVAL_SECS") {
            if let Ok(interval) = interval_str.parse::<u64>() {
                if interval >= 1 {
                    cfg.check_interval_secs = interval;
                }
            }
        }

        cfg
    }
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the upwatch server.
    pub server_url: String,
    /// This host's reporting credential.
    pub token: String,
    /// Initial report cadence, replaced by the server's answer.
    pub report_interval: u64,
    /// Routes probed for packet loss estimation.
    pub routes: Vec<RouteTarget>,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPWATCH_SERVER_URL`: server base URL (default: http://localhost:8080)
    /// - `UPWATCH_AGENT_TOKEN`: per-host credential (required)
    /// - `UPWATCH_AGENT_ROUTES`: `key=host:port,...` (default: built-in set)
    pub fn load() -> Result<Self, ConfigError> {
        let token = env::var("UPWATCH_AGENT_TOKEN").map_err(|_| ConfigError::MissingToken)?;

        let server_url = env::var("UPWATCH_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let routes = match env::var("UPWATCH_AGENT_ROUTES") {
            Ok(raw) => {
                let routes = parse_routes(&raw);
                if routes.is_empty() {
                    default_routes()
                } else {
                    routes
                }
            }
            Err(_) => default_routes(),
        };

        Ok(Self {
            server_url,
            token,
            report_interval: DEFAULT_REPORT_INTERVAL_SECS,
            routes,
        })
    }
}

//! Configuration for ZapFlow

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Dispatch loop configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Connected messaging accounts
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_bind")]
    pub bind: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

fn default_api_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./zapflow.db")
}

fn default_max_connections() -> u32 {
    5
}

/// Dispatch loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Interval between dispatch ticks (seconds)
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Upper bound on a single transport send (seconds); timeout counts as failed
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    5
}

fn default_send_timeout_secs() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// A connected messaging account (WhatsApp Business Cloud API credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account identifier used across settings and scheduled messages
    pub id: String,

    /// WhatsApp Phone Number ID
    pub phone_number_id: String,

    /// Graph API access token
    pub access_token: String,
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./zapflow.toml"),
            std::path::PathBuf::from("./config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // A missing file is fine for a desktop deployment: defaults apply
        // and no accounts are connected until configured.
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.dispatch.tick_secs, 5);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[api]
port = 9090

[database]
path = "/data/zapflow.db"

[dispatch]
tick_secs = 3
send_timeout_secs = 20

[[accounts]]
id = "main"
phone_number_id = "123456789"
access_token = "token"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.dispatch.tick_secs, 3);
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].id, "main");
    }
}

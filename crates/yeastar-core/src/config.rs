//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use chrono::{DateTime, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub linking: LinkingConfig,
    #[serde(default)]
    pub pbx: PbxConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9002
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply embedded migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// Redis configuration
///
/// Redis is optional; without a URL, extension lookups always hit the database.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default)]
    pub url: Option<String>,

    /// TTL for cached extension mappings in seconds
    #[serde(default = "default_agent_ttl")]
    pub agent_ttl_secs: u64,
}

fn default_agent_ttl() -> u64 {
    300
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            agent_ttl_secs: default_agent_ttl(),
        }
    }
}

/// Webhook receiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// When false, deliveries are acknowledged but not stored
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Shared secret expected from the PBX; `None` disables the check
    #[serde(default)]
    pub secret: Option<String>,

    /// Maximum accepted body size in bytes
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
}

fn default_max_payload() -> usize {
    256 * 1024
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret: None,
            max_payload_bytes: default_max_payload(),
        }
    }
}

/// Contact matching configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkingConfig {
    /// Country code prefixed to local numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Numbers with fewer digits are treated as internal extensions
    #[serde(default = "default_min_external_digits")]
    pub min_external_digits: usize,

    /// Trailing digits used for fuzzy matching; 0 disables it
    #[serde(default)]
    pub suffix_match_digits: usize,

    /// Create a Lead when no Customer or Lead matches
    #[serde(default)]
    pub create_lead_if_not_found: bool,
}

fn default_country_code() -> String {
    "+966".to_string()
}

fn default_min_external_digits() -> usize {
    6
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
            min_external_digits: default_min_external_digits(),
            suffix_match_digits: 0,
            create_lead_if_not_found: false,
        }
    }
}

/// Yeastar PBX configuration (timezone and OpenAPI sync)
#[derive(Debug, Deserialize, Clone)]
pub struct PbxConfig {
    /// Timezone used for naive timestamps in payloads
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// PBX base URL, e.g. `https://pbx.example.com:8088`
    #[serde(default)]
    pub base_url: Option<String>,

    /// OpenAPI path prefix
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,

    /// OpenAPI client id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OpenAPI client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Outbound request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Run the periodic CDR sync
    #[serde(default)]
    pub sync_enabled: bool,

    /// Also pull the extension list during sync
    #[serde(default)]
    pub sync_extensions: bool,

    /// Interval between sync runs in seconds
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Start of the first CDR window (RFC 3339); defaults to 24 hours ago
    #[serde(default)]
    pub sync_from: Option<DateTime<Utc>>,

    /// Page size for list endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Extension list endpoint
    #[serde(default = "default_extensions_endpoint")]
    pub extensions_endpoint: String,

    /// CDR list endpoint
    #[serde(default = "default_call_logs_endpoint")]
    pub call_logs_endpoint: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_api_base_path() -> String {
    "/openapi/v1.0".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_sync_interval() -> u64 {
    300
}

fn default_page_size() -> u32 {
    100
}

fn default_extensions_endpoint() -> String {
    "/extension/list".to_string()
}

fn default_call_logs_endpoint() -> String {
    "/cdr/list".to_string()
}

impl Default for PbxConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            base_url: None,
            api_base_path: default_api_base_path(),
            client_id: None,
            client_secret: None,
            request_timeout_secs: default_request_timeout(),
            sync_enabled: false,
            sync_extensions: false,
            sync_interval_secs: default_sync_interval(),
            sync_from: None,
            page_size: default_page_size(),
            extensions_endpoint: default_extensions_endpoint(),
            call_logs_endpoint: default_call_logs_endpoint(),
        }
    }
}

impl PbxConfig {
    /// True when enough settings are present to talk to the OpenAPI
    pub fn has_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.base_url) && filled(&self.client_id) && filled(&self.client_secret)
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9002)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.run_migrations", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with YEASTAR_ prefix
            .add_source(
                Environment::with_prefix("YEASTAR")
                    .separator("__")
                    .try_parsing(true),
            )
            // Support the conventional DATABASE_URL variable
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("YEASTAR").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .and_then(Config::try_deserialize)
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = from_toml(
            r#"
            [database]
            url = "postgresql://localhost/yeastar"
            "#,
        );

        assert_eq!(config.server.port, 9002);
        assert!(config.database.run_migrations);
        assert!(config.webhook.enabled);
        assert!(config.webhook.secret.is_none());
        assert_eq!(config.linking.default_country_code, "+966");
        assert_eq!(config.linking.suffix_match_digits, 0);
        assert_eq!(config.pbx.timezone, "UTC");
        assert!(!config.pbx.sync_enabled);
        assert!(config.redis.url.is_none());
    }

    #[test]
    fn test_pbx_credentials_check() {
        let mut pbx = PbxConfig::default();
        assert!(!pbx.has_credentials());

        pbx.base_url = Some("https://pbx.local".to_string());
        pbx.client_id = Some("id".to_string());
        pbx.client_secret = Some("  ".to_string());
        assert!(!pbx.has_credentials());

        pbx.client_secret = Some("secret".to_string());
        assert!(pbx.has_credentials());
    }

    #[test]
    fn test_server_addr() {
        let config = from_toml(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8088
            [database]
            url = "postgresql://localhost/yeastar"
            "#,
        );
        assert_eq!(config.server_addr(), "127.0.0.1:8088");
    }
}

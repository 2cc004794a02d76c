//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Bootstrap local actor, created at start-up when missing
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Admin username (default: "admin")
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Admin display name (default: "Admin")
    #[serde(default = "default_admin_display_name")]
    pub display_name: String,
    /// Admin bio/note
    pub note: Option<String>,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_display_name() -> String {
    "Admin".to_string()
}

/// Federation engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Timeout for outbound fetches and deliveries (default: 10)
    pub fetch_timeout_seconds: u64,
    /// Remote actor cache TTL in seconds; 0 keeps entries for the process lifetime
    pub actor_cache_ttl_seconds: u64,
    /// Minimum age of a cached actor before a failed signature may re-fetch it
    pub min_refresh_interval_seconds: u64,
    /// Maximum clock skew for a signed Date header (default: 43200 = 12h)
    pub signature_max_age_seconds: i64,
    /// Answer incoming Follow activities with Accept
    pub auto_accept_follows: bool,
    /// Allow fetching actors on loopback/private addresses (development only)
    pub allow_private_hosts: bool,
    /// Scheme used for WebFinger discovery of remote handles
    pub remote_scheme: String,
    /// Maximum concurrent deliveries during fan-out
    pub delivery_concurrency: usize,
}

impl FederationConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds.max(1))
    }

    /// Remote actor cache TTL, `None` when entries never expire
    pub fn actor_cache_ttl(&self) -> Option<Duration> {
        (self.actor_cache_ttl_seconds > 0).then(|| Duration::from_secs(self.actor_cache_ttl_seconds))
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_seconds)
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: 10,
            actor_cache_ttl_seconds: 86_400,
            min_refresh_interval_seconds: 60,
            signature_max_age_seconds: 43_200,
            auto_accept_follows: true,
            allow_private_hosts: false,
            remote_scheme: "https".to_string(),
            delivery_concurrency: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDIPOST__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("server.domain", "localhost:8080")?
            .set_default("database.path", "data/fedipost.db")?
            .set_default("admin.username", "admin")?
            .set_default("admin.display_name", "Admin")?
            .set_default("federation.fetch_timeout_seconds", 10)?
            .set_default("federation.actor_cache_ttl_seconds", 86400)?
            .set_default("federation.min_refresh_interval_seconds", 60)?
            .set_default("federation.signature_max_age_seconds", 43200)?
            .set_default("federation.auto_accept_follows", true)?
            .set_default("federation.allow_private_hosts", false)?
            .set_default("federation.remote_scheme", "https")?
            .set_default("federation.delivery_concurrency", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDIPOST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        let protocol = self.server.protocol.to_ascii_lowercase();
        if protocol != "http" && protocol != "https" {
            return Err(crate::error::AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                self.server.protocol
            )));
        }

        if protocol == "http" && !is_local_server_domain(&self.server.domain) {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        if !matches!(self.federation.remote_scheme.as_str(), "http" | "https") {
            return Err(crate::error::AppError::Config(format!(
                "federation.remote_scheme must be http or https, got {}",
                self.federation.remote_scheme
            )));
        }

        if self.federation.delivery_concurrency == 0 {
            return Err(crate::error::AppError::Config(
                "federation.delivery_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.federation.allow_private_hosts {
            tracing::warn!("Fetching actors from private and loopback hosts is allowed");
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

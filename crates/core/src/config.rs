//! Configuration types shared across crates.

use crate::key::KeyPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3500").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:3500".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Materialized-result cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding generated CSV artifacts. Created on first use.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Maximum artifact age in minutes before it is regenerated (0 = always).
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    /// Whether artifacts are shared across tokens (`scope`) or per token (`token`).
    #[serde(default)]
    pub key_policy: KeyPolicy,
    /// Serve the previous artifact when regeneration fails (default: false,
    /// the error is returned to the caller).
    #[serde(default)]
    pub serve_stale_on_error: bool,
    /// How long a request waits for a regeneration before giving up
    /// (default: None = wait indefinitely). The regeneration itself keeps running.
    #[serde(default)]
    pub regeneration_timeout_secs: Option<u64>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_ttl_minutes() -> u64 {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_minutes: default_ttl_minutes(),
            key_policy: KeyPolicy::default(),
            serve_stale_on_error: false,
            regeneration_timeout_secs: None,
        }
    }
}

impl CacheConfig {
    /// Get the TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    /// Get the regeneration wait timeout, if configured.
    pub fn regeneration_timeout(&self) -> Option<Duration> {
        self.regeneration_timeout_secs.map(Duration::from_secs)
    }
}

/// DuckDB connection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local database file used for requests without a token.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// Connection target for requests carrying a token (default: "md:").
    /// The token is supplied through the connection configuration, never the target string.
    #[serde(default = "default_remote_target")]
    pub remote_target: String,
    /// Open the local database read-only (default: true).
    #[serde(default = "default_read_only")]
    pub read_only: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("local.db")
}

fn default_remote_target() -> String {
    "md:".to_string()
}

fn default_read_only() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            remote_target: default_remote_target(),
            read_only: default_read_only(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset (e.g., "info", "csvgate_server=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional file that receives a copy of every log line.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in `dir`.
    ///
    /// **For testing only.** Cache and database live under the given directory.
    pub fn for_testing(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                metrics_enabled: false,
            },
            cache: CacheConfig {
                dir: dir.join("cache"),
                ..CacheConfig::default()
            },
            database: DatabaseConfig {
                path: dir.join("local.db"),
                ..DatabaseConfig::default()
            },
            log: LogConfig::default(),
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.cache.dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("cache.dir must not be empty".to_string()));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(crate::Error::Config(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.database.remote_target.is_empty() {
            return Err(crate::Error::Config(
                "database.remote_target must not be empty".to_string(),
            ));
        }
        if self.cache.regeneration_timeout_secs == Some(0) {
            return Err(crate::Error::Config(
                "cache.regeneration_timeout_secs must be at least 1; omit it to wait indefinitely"
                    .to_string(),
            ));
        }
        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            crate::Error::Config(format!("server.bind '{}' is invalid: {e}", self.server.bind))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Figment;
    use figment::providers::{Format, Toml};

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:3500");
        assert_eq!(config.cache.dir, PathBuf::from("cache"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.cache.key_policy, KeyPolicy::Scope);
        assert!(!config.cache.serve_stale_on_error);
        assert!(config.cache.regeneration_timeout().is_none());
        assert_eq!(config.database.path, PathBuf::from("local.db"));
        assert_eq!(config.database.remote_target, "md:");
        assert!(config.database.read_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cache.ttl_minutes, 1);
        assert!(config.server.metrics_enabled);
    }

    #[test]
    fn toml_overrides_are_applied() {
        let toml = r#"
            [cache]
            dir = "/var/cache/csvgate"
            ttl_minutes = 15
            key_policy = "token"
            serve_stale_on_error = true
            regeneration_timeout_secs = 30

            [database]
            path = "/data/warehouse.duckdb"
        "#;

        let config: AppConfig = Figment::new().merge(Toml::string(toml)).extract().unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/csvgate"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(15 * 60));
        assert_eq!(config.cache.key_policy, KeyPolicy::Token);
        assert!(config.cache.serve_stale_on_error);
        assert_eq!(
            config.cache.regeneration_timeout(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.database.path, PathBuf::from("/data/warehouse.duckdb"));
        assert_eq!(config.database.remote_target, "md:");
    }

    #[test]
    fn zero_ttl_is_allowed() {
        let config: AppConfig =
            serde_json::from_str(r#"{"cache": {"ttl_minutes": 0}}"#).unwrap();
        assert_eq!(config.cache.ttl(), Duration::ZERO);
    }

    #[test]
    fn huge_ttl_saturates() {
        let cache = CacheConfig {
            ttl_minutes: u64::MAX,
            ..CacheConfig::default()
        };
        assert_eq!(cache.ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn validate_rejects_bad_bind() {
        let mut config = AppConfig::default();
        config.server.bind = "not an address".to_string();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn validate_rejects_empty_paths() {
        let mut config = AppConfig::default();
        config.cache.dir = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_regeneration_timeout() {
        let mut config = AppConfig::default();
        config.cache.regeneration_timeout_secs = Some(0);
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        config.cache.regeneration_timeout_secs = Some(1);
        assert!(config.validate().is_ok());
    }
}

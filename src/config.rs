//! Configuration handling for managed database endpoints.
//!
//! Two layers: the storage section (a JSON object describing every endpoint)
//! and the binary's CLI arguments and environment variables.

use crate::error::{DbError, DbResult};
use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_STORAGE_CONFIG: &str = "storage.json";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Query keys consumed by the pool rather than the driver.
const POOL_OPTION_KEYS: &[&str] = &[
    "max_connections",
    "min_connections",
    "idle_timeout",
    "acquire_timeout",
    "test_before_acquire",
];

/// Connection pool configuration options parsed from the connection URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }

    /// Split pool keys out of a driver URL.
    ///
    /// Returns the URL the driver should see and the parsed pool options.
    /// A URL without pool keys is returned untouched.
    pub fn split_from_url(connection_string: &str) -> Result<(String, PoolOptions), String> {
        let mut url = Url::parse(connection_string)
            .map_err(|e| format!("Invalid connection URL: {}", e))?;

        let has_pool_keys = url
            .query_pairs()
            .any(|(k, _)| POOL_OPTION_KEYS.contains(&k.to_ascii_lowercase().as_str()));
        if !has_pool_keys {
            return Ok((connection_string.to_string(), PoolOptions::default()));
        }

        let mut opts = extract_options(&mut url, POOL_OPTION_KEYS);
        let pool_options = parse_pool_options(&mut opts);
        pool_options.validate()?;
        Ok((url.to_string(), pool_options))
    }
}

/// Parse pool options from extracted URL query parameters.
fn parse_pool_options(opts: &mut HashMap<String, String>) -> PoolOptions {
    PoolOptions {
        max_connections: opts.remove("max_connections").and_then(|v| v.parse().ok()),
        min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
        idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
        acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
        test_before_acquire: opts.remove("test_before_acquire").and_then(|v| {
            if v.eq_ignore_ascii_case("true") {
                Some(true)
            } else if v.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None // Invalid value ignored
            }
        }),
    }
}

/// Extract the given keys from URL query params, keeping others for the driver.
/// Uses proper URL encoding to preserve special characters in remaining params.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// One endpoint's section of the storage configuration.
///
/// Every field is optional at this level; required fields are checked when
/// the section is applied to an endpoint.
#[derive(Clone, Default, Deserialize)]
pub struct EndpointSection {
    /// Overrides the endpoint's name when present
    pub nameid: Option<String>,
    pub database_type: Option<String>,
    /// `host:port`
    pub address: Option<String>,
    pub user_name: Option<String>,
    /// Contains sensitive data - never log
    pub user_password: Option<String>,
    pub database_name: Option<String>,
    pub connection_options: Option<String>,
    #[serde(default)]
    pub create_script_files: Vec<PathBuf>,
    pub must_connected: Option<bool>,
    pub is_connect_at_start: Option<bool>,
}

impl std::fmt::Debug for EndpointSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSection")
            .field("nameid", &self.nameid)
            .field("database_type", &self.database_type)
            .field("address", &self.address)
            .field("user_name", &self.user_name)
            .field("database_name", &self.database_name)
            .field("connection_options", &self.connection_options)
            .field("create_script_files", &self.create_script_files)
            .field("must_connected", &self.must_connected)
            .field("is_connect_at_start", &self.is_connect_at_start)
            .finish_non_exhaustive()
    }
}

/// The storage configuration: endpoint sections keyed by endpoint name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StorageConfig {
    endpoints: BTreeMap<String, EndpointSection>,
}

impl StorageConfig {
    /// Parse a storage configuration from JSON text.
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbError::invalid_input(format!("Invalid storage configuration: {}", e)))
    }

    /// Read and parse a storage configuration file.
    pub async fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| {
                DbError::invalid_input(format!(
                    "Cannot read storage configuration '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        Self::from_json_str(&text)
    }

    /// Add or replace a section.
    pub fn insert(&mut self, name: impl Into<String>, section: EndpointSection) {
        self.endpoints.insert(name.into(), section);
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointSection> {
        self.endpoints.get(name)
    }

    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Command line configuration for the `managed-db` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "managed-db",
    about = "Connect configured database endpoints, run their create scripts and watch their health",
    version,
    author
)]
pub struct Config {
    /// Storage configuration file (JSON object keyed by endpoint name)
    #[arg(
        short = 'c',
        long,
        value_name = "FILE",
        default_value = DEFAULT_STORAGE_CONFIG,
        env = "MANAGED_DB_STORAGE_CONFIG"
    )]
    pub storage_config: PathBuf,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MANAGED_DB_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Seconds between health checks of connected endpoints
    #[arg(
        long,
        default_value_t = DEFAULT_HEALTH_INTERVAL_SECS,
        env = "MANAGED_DB_HEALTH_INTERVAL"
    )]
    pub health_interval: u64,

    /// Execute every endpoint's create scripts after connecting
    #[arg(long, env = "MANAGED_DB_RUN_CREATE_SCRIPTS")]
    pub run_create_scripts: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MANAGED_DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MANAGED_DB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            storage_config: PathBuf::from(DEFAULT_STORAGE_CONFIG),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            health_interval: DEFAULT_HEALTH_INTERVAL_SECS,
            run_create_scripts: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Get the health check interval as a Duration.
    pub fn health_interval_duration(&self) -> Duration {
        Duration::from_secs(self.health_interval.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage_config, PathBuf::from("storage.json"));
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(!config.run_create_scripts);
    }

    #[test]
    fn test_timeout_durations() {
        let config = Config {
            query_timeout: 60,
            health_interval: 0,
            ..Config::default()
        };
        assert_eq!(config.query_timeout_duration(), Duration::from_secs(60));
        assert_eq!(config.health_interval_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::parse_from([
            "managed-db",
            "--storage-config",
            "/etc/app/storage.json",
            "--run-create-scripts",
            "--health-interval",
            "5",
        ]);
        assert_eq!(config.storage_config, PathBuf::from("/etc/app/storage.json"));
        assert!(config.run_create_scripts);
        assert_eq!(config.health_interval, 5);
    }

    // =========================================================================
    // Storage Configuration Tests
    // =========================================================================

    #[test]
    fn test_storage_config_from_json() {
        let storage = StorageConfig::from_json_str(
            r#"{
                "main": {
                    "nameid": "primary",
                    "database_type": "postgresql",
                    "address": "localhost:5432",
                    "user_name": "app",
                    "user_password": "secret",
                    "database_name": "shop",
                    "connection_options": "sslmode=disable",
                    "create_script_files": ["schema/001.sql", "schema/002.sql"],
                    "must_connected": true,
                    "is_connect_at_start": true
                },
                "audit": { "database_type": "sqlite" }
            }"#,
        )
        .unwrap();

        let main = storage.endpoint("main").unwrap();
        assert_eq!(main.nameid.as_deref(), Some("primary"));
        assert_eq!(main.create_script_files.len(), 2);
        assert_eq!(main.must_connected, Some(true));

        let audit = storage.endpoint("audit").unwrap();
        assert!(audit.address.is_none());
        assert!(audit.create_script_files.is_empty());

        assert_eq!(storage.endpoint_names().collect::<Vec<_>>(), vec!["audit", "main"]);
    }

    #[tokio::test]
    async fn test_storage_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StorageConfig::from_file(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, DbError::InvalidInput { ref message } if message.contains("absent.json")),
            "{err}"
        );
    }

    #[test]
    fn test_storage_config_invalid_json() {
        let err = StorageConfig::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_endpoint_section_debug_hides_password() {
        let section = EndpointSection {
            user_password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{section:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_storage_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"db": {"database_type": "mysql"}}"#).unwrap();

        let storage = StorageConfig::from_file(&path).await.unwrap();
        assert_eq!(
            storage.endpoint("db").and_then(|s| s.database_type.as_deref()),
            Some("mysql")
        );

        let missing = StorageConfig::from_file(dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(DbError::Script { .. })));
    }

    // =========================================================================
    // Pool Options Tests
    // =========================================================================

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_connections_or_default(false), 10);
        assert_eq!(opts.max_connections_or_default(true), 1);
        assert_eq!(opts.min_connections_or_default(), 1);
        assert_eq!(opts.idle_timeout_or_default(), 600);
        assert_eq!(opts.acquire_timeout_or_default(), 30);
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_custom_values() {
        let opts = PoolOptions {
            max_connections: Some(20),
            min_connections: Some(5),
            idle_timeout_secs: Some(300),
            acquire_timeout_secs: Some(60),
            test_before_acquire: Some(false),
        };
        assert_eq!(opts.max_connections_or_default(false), 20);
        assert_eq!(opts.max_connections_or_default(true), 20);
        assert_eq!(opts.min_connections_or_default(), 5);
        assert_eq!(opts.idle_timeout_or_default(), 300);
        assert_eq!(opts.acquire_timeout_or_default(), 60);
        assert!(!opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_split_pool_options_from_url() {
        let (url, opts) = PoolOptions::split_from_url(
            "mysql://u:p@host/db?max_connections=20&charset=utf8&idle_timeout=300",
        )
        .unwrap();

        assert_eq!(opts.max_connections, Some(20));
        assert_eq!(opts.idle_timeout_secs, Some(300));
        assert!(opts.acquire_timeout_secs.is_none());
        assert!(url.contains("charset=utf8"));
        assert!(!url.contains("max_connections"));
        assert!(!url.contains("idle_timeout"));
    }

    #[test]
    fn test_split_without_pool_keys_is_untouched() {
        let original = "postgresql://u:p@localhost:5432/db?";
        let (url, opts) = PoolOptions::split_from_url(original).unwrap();
        assert_eq!(url, original);
        assert_eq!(opts, PoolOptions::default());
    }

    #[test]
    fn test_split_sqlite_url() {
        let (url, opts) =
            PoolOptions::split_from_url("sqlite:/tmp/app.db?mode=rwc&max_connections=2").unwrap();
        assert_eq!(opts.max_connections, Some(2));
        assert!(url.starts_with("sqlite:/tmp/app.db"));
        assert!(url.contains("mode=rwc"));
    }

    #[test]
    fn test_pool_options_invalid_boolean_ignored() {
        let (_, opts) =
            PoolOptions::split_from_url("mysql://host/db?test_before_acquire=garbage").unwrap();
        assert!(opts.test_before_acquire.is_none());

        let (_, opts) =
            PoolOptions::split_from_url("mysql://host/db?test_before_acquire=FALSE").unwrap();
        assert_eq!(opts.test_before_acquire, Some(false));
    }

    #[test]
    fn test_pool_options_validation() {
        let err = PoolOptions::split_from_url("mysql://host/db?max_connections=0").unwrap_err();
        assert!(err.contains("max_connections"));

        let err = PoolOptions::split_from_url("mysql://host/db?min_connections=0").unwrap_err();
        assert!(err.contains("min_connections"));

        let err =
            PoolOptions::split_from_url("mysql://host/db?min_connections=10&max_connections=5")
                .unwrap_err();
        assert!(err.contains("cannot exceed"));
    }

    #[test]
    fn test_url_encoding_preserved_in_connection_string() {
        let (url, opts) = PoolOptions::split_from_url(
            "mysql://host/db?sslcert=%2Ftmp%2Fcert%26key.pem&max_connections=20",
        )
        .unwrap();

        assert_eq!(opts.max_connections, Some(20));
        assert!(url.contains("sslcert="));
        assert!(!url.contains("max_connections"));
    }
}

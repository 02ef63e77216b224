//! Server configuration loading from file and environment variables.

use fedagg_cache::{CacheError, CacheStore, FileCacheStore, PoolSettings, SqliteCacheStore};
use fedagg_core::{AggregatorRegistry, FetchSettings};
use fedagg_types::AggregatorConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration shared by the server and the refresh CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache backend settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background refresh schedules.
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,

    /// Configured feeds, keyed by aggregator id.
    #[serde(default)]
    pub aggregators: BTreeMap<String, AggregatorConfig>,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which [`CacheStore`] implementation backs the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Sqlite,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory of the file backend.
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// Database file of the SQLite backend.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// HTTP client configuration for source fetches.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the default `fedagg/<version>` user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Directory relative key, certificate and CA paths resolve against.
    #[serde(default)]
    pub cert_dir: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "fedagg_core=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Refreshes every aggregator whose `cron_tag` equals `tag` once per interval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    pub tag: String,
    pub interval_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

fn default_sqlite_path() -> String {
    "fedagg-cache.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    PoolSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    PoolSettings::default().pool_max_size
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: default_cache_dir(),
            sqlite_path: default_sqlite_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    pub fn fetch_settings(&self) -> FetchSettings {
        let defaults = FetchSettings::default();
        FetchSettings {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            user_agent: self
                .fetch
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
        }
    }

    /// Opens the configured cache backend.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the SQLite database cannot be opened or
    /// migrated. The file backend creates its directory lazily and cannot
    /// fail here.
    pub fn open_cache_store(&self) -> Result<Arc<dyn CacheStore>, CacheError> {
        match self.cache.backend {
            CacheBackend::File => Ok(Arc::new(FileCacheStore::new(&self.cache.dir))),
            CacheBackend::Sqlite => {
                let store = SqliteCacheStore::open(
                    &self.cache.sqlite_path,
                    PoolSettings {
                        busy_timeout_ms: self.cache.busy_timeout_ms,
                        pool_max_size: self.cache.pool_max_size,
                    },
                )?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Builds the aggregator registry over `store`.
    pub fn registry(&self, store: Arc<dyn CacheStore>) -> AggregatorRegistry {
        let registry = AggregatorRegistry::new(self.aggregators.clone(), store)
            .with_fetch_settings(self.fetch_settings());
        match &self.paths.cert_dir {
            Some(dir) => registry.with_cert_dir(PathBuf::from(dir)),
            None => registry,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `FEDAGG_HOST` overrides `server.host`
/// - `FEDAGG_PORT` overrides `server.port`
/// - `FEDAGG_CACHE_DIR` overrides `cache.dir`
/// - `FEDAGG_LOG_LEVEL` overrides `logging.level`
/// - `FEDAGG_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `FEDAGG_*` overrides read through `var`.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("FEDAGG_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("FEDAGG_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(dir) = var("FEDAGG_CACHE_DIR") {
        config.cache.dir = dir;
    }
    if let Some(level) = var("FEDAGG_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("FEDAGG_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

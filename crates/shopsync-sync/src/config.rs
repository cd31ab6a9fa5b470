//! # Sync Configuration
//!
//! Configuration management for the store's sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SHOPSYNC_CENTRAL_URL=postgres://sync@hq/shopsync                   │
//! │     SHOPSYNC_STORE_ID=store-017                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/shopsync/shopsync.toml (Linux)                           │
//! │     ~/Library/Application Support/com.shopsync.shopsync/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! id = "store-017"
//! name = "Harbour Street"
//!
//! [local]
//! database_path = "/var/lib/shopsync/store.db"
//!
//! [central]
//! host = "hq.example.com"
//! database = "shopsync"
//! username = "store017"
//! password = "..."
//!
//! [sync]
//! auto_sync_interval_secs = 300
//! queue_threshold = 50
//! ```
//!
//! The engine only reads configuration; `save()` exists for setup tooling.

use serde::{Deserialize, Serialize};
use shopsync_db::{DbConfig, QueueLimits};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Unique store identifier. Also part of the sync lock holder id.
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: "default-store".to_string(),
            name: "Default Store".to_string(),
        }
    }
}

// =============================================================================
// Local Store
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// SQLite file. Filled with the platform data directory on `load()`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_local_connections")]
    pub max_connections: u32,
}

fn default_local_connections() -> u32 {
    5
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            database_path: None,
            max_connections: default_local_connections(),
        }
    }
}

// =============================================================================
// Central Database
// =============================================================================

/// Connection settings for the central PostgreSQL database.
///
/// `url` wins over the individual parts when both are given.
#[derive(Clone, Serialize, Deserialize)]
pub struct CentralConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_central_host")]
    pub host: String,

    #[serde(default = "default_central_port")]
    pub port: u16,

    #[serde(default = "default_central_database")]
    pub database: String,

    #[serde(default = "default_central_username")]
    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bound on every pull and push call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bound on the health probe behind status snapshots.
    #[serde(default = "default_probe_timeout")]
    pub status_probe_timeout_secs: u64,

    #[serde(default = "default_central_connections")]
    pub max_connections: u32,
}

fn default_central_host() -> String {
    "localhost".to_string()
}
fn default_central_port() -> u16 {
    5432
}
fn default_central_database() -> String {
    "shopsync".to_string()
}
fn default_central_username() -> String {
    "shopsync".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    3
}
fn default_central_connections() -> u32 {
    5
}

impl Default for CentralConfig {
    fn default() -> Self {
        CentralConfig {
            url: None,
            host: default_central_host(),
            port: default_central_port(),
            database: default_central_database(),
            username: default_central_username(),
            password: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            status_probe_timeout_secs: default_probe_timeout(),
            max_connections: default_central_connections(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for CentralConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralConfig")
            .field("url", &self.url.as_ref().map(|_| "<set>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("status_probe_timeout_secs", &self.status_probe_timeout_secs)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl CentralConfig {
    /// PostgreSQL connection URL built from `url` or the individual parts.
    pub fn connection_url(&self) -> SyncResult<Url> {
        let url = match &self.url {
            Some(raw) => Url::parse(raw)?,
            None => {
                let mut url = Url::parse(&format!(
                    "postgres://{}:{}/{}",
                    self.host, self.port, self.database
                ))?;
                url.set_username(&self.username)
                    .map_err(|_| SyncError::InvalidUrl(format!("invalid username '{}'", self.username)))?;
                url.set_password(self.password.as_deref())
                    .map_err(|_| SyncError::InvalidUrl("password cannot be set on this URL".into()))?;
                url
            }
        };

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(SyncError::InvalidUrl(format!(
                "central URL must use postgres:// or postgresql://, got {}://",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn status_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.status_probe_timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_true")]
    pub auto_sync_enabled: bool,

    /// Minimum time between scheduled cycles.
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u64,

    /// A cycle starts once pending entries exceed this, regardless of the interval.
    #[serde(default = "default_queue_threshold")]
    pub queue_threshold: u64,

    /// Queue entries per push batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Central rows per pull call.
    #[serde(default = "default_pull_batch_size")]
    pub pull_batch_size: u32,

    /// Capacity of the queue (pending + dead).
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u64,

    /// Failed pushes before an entry is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lease on the cycle lock. A running cycle renews it before every
    /// central call; a crashed cycle's lock lapses after this long.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    /// Operator-facing sync log. No file is written when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_auto_sync_interval() -> u64 {
    300
}
fn default_queue_threshold() -> u64 {
    50
}
fn default_batch_size() -> u32 {
    100
}
fn default_pull_batch_size() -> u32 {
    500
}
fn default_max_queue_size() -> u64 {
    shopsync_db::access::DEFAULT_MAX_QUEUE_SIZE
}
fn default_max_attempts() -> u32 {
    5
}
fn default_lock_ttl() -> u64 {
    600
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_sync_enabled: true,
            auto_sync_interval_secs: default_auto_sync_interval(),
            queue_threshold: default_queue_threshold(),
            batch_size: default_batch_size(),
            pull_batch_size: default_pull_batch_size(),
            max_queue_size: default_max_queue_size(),
            max_attempts: default_max_attempts(),
            lock_ttl_secs: default_lock_ttl(),
            log_path: None,
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub central: CentralConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (shopsync.toml)
    /// 3. Environment variables
    /// 4. Platform paths for anything still unset
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.fill_default_paths();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            let mut config = Self::default();
            config.fill_default_paths();
            config
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.store.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("store.id must not be empty".into()));
        }

        self.central.connection_url()?;

        let positive = [
            ("sync.batch_size", u64::from(self.sync.batch_size)),
            ("sync.pull_batch_size", u64::from(self.sync.pull_batch_size)),
            ("sync.max_queue_size", self.sync.max_queue_size),
            ("sync.max_attempts", u64::from(self.sync.max_attempts)),
            ("sync.lock_ttl_secs", self.sync.lock_ttl_secs),
            ("central.connect_timeout_secs", self.central.connect_timeout_secs),
            ("central.request_timeout_secs", self.central.request_timeout_secs),
            ("central.status_probe_timeout_secs", self.central.status_probe_timeout_secs),
            ("local.max_connections", u64::from(self.local.max_connections)),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SyncError::InvalidConfig(format!("{name} must be greater than 0")));
        }

        // The cycle renews its lease between central calls, so one call must fit inside it
        let longest_call = self.central.connect_timeout_secs.max(self.central.request_timeout_secs);
        if self.sync.lock_ttl_secs <= longest_call {
            return Err(SyncError::InvalidConfig(format!(
                "sync.lock_ttl_secs ({}) must exceed the longest central timeout ({longest_call}s)",
                self.sync.lock_ttl_secs
            )));
        }

        Ok(())
    }

    /// Applies `SHOPSYNC_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("SHOPSYNC_STORE_ID") {
            debug!(store_id = %id, "Overriding store ID from environment");
            self.store.id = id;
        }
        if let Some(path) = lookup("SHOPSYNC_DATABASE_PATH") {
            self.local.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("SHOPSYNC_CENTRAL_URL") {
            debug!("Overriding central URL from environment");
            self.central.url = Some(url);
        }
        if let Some(host) = lookup("SHOPSYNC_CENTRAL_HOST") {
            self.central.host = host;
        }
        if let Some(port) = lookup("SHOPSYNC_CENTRAL_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.central.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid SHOPSYNC_CENTRAL_PORT"),
            }
        }
        if let Some(database) = lookup("SHOPSYNC_CENTRAL_DATABASE") {
            self.central.database = database;
        }
        if let Some(user) = lookup("SHOPSYNC_CENTRAL_USER") {
            self.central.username = user;
        }
        if let Some(password) = lookup("SHOPSYNC_CENTRAL_PASSWORD") {
            self.central.password = Some(password);
        }
        if let Some(enabled) = lookup("SHOPSYNC_AUTO_SYNC") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.auto_sync_enabled = true,
                "0" | "false" | "no" | "off" => self.sync.auto_sync_enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid SHOPSYNC_AUTO_SYNC"),
            }
        }
        if let Some(secs) = lookup("SHOPSYNC_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.auto_sync_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid SHOPSYNC_SYNC_INTERVAL_SECS"),
            }
        }
        if let Some(path) = lookup("SHOPSYNC_LOG_PATH") {
            self.sync.log_path = Some(PathBuf::from(path));
        }
    }

    fn fill_default_paths(&mut self) {
        if let Some(dirs) = Self::project_dirs() {
            if self.local.database_path.is_none() {
                self.local.database_path = Some(dirs.data_dir().join("store.db"));
            }
            if self.sync.log_path.is_none() {
                self.sync.log_path = Some(dirs.data_dir().join("sync.log"));
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "shopsync", "shopsync")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("shopsync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn store_id(&self) -> &str {
        &self.store.id
    }

    /// LocalStore settings; fails when no database path is known.
    pub fn db_config(&self) -> SyncResult<DbConfig> {
        let path = self
            .local
            .database_path
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("local.database_path is not set".into()))?;
        Ok(DbConfig::new(path).max_connections(self.local.max_connections))
    }

    pub fn queue_limits(&self) -> QueueLimits {
        QueueLimits {
            max_queue_size: self.sync.max_queue_size,
        }
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.auto_sync_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.sync.lock_ttl_secs)
    }
}

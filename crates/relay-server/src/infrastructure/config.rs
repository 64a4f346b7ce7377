//! TOML-based configuration for the relay server.
//!
//! Reads `ServerConfig` from the platform-appropriate config file unless a
//! path is given on the command line:
//! - Windows:  `%APPDATA%\NotifyRelay\config.toml`
//! - Linux:    `~/.config/notify-relay/config.toml`
//! - macOS:    `~/Library/Application Support/NotifyRelay/config.toml`
//!
//! Example:
//!
//! ```toml
//! [server]
//! http_bind = "0.0.0.0:5000"
//! ws_bind = "0.0.0.0:5001"
//! log_level = "info"
//!
//! [pairing]
//! session_ttl_secs = 900
//! sweep_interval_secs = 60
//!
//! [auth]
//! jwt_secret = "change-me"
//! token_ttl_days = 30
//!
//! [notifications]
//! default_page_size = 20
//! max_page_size = 100
//! ```
//!
//! Every field has a serde default, so an empty file (or no file at all)
//! produces a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is unusable (zero TTL, page size of zero, …).
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Listener addresses and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenConfig {
    /// `host:port` for the REST API.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    /// `host:port` for the real-time WebSocket channel.
    #[serde(default = "default_ws_bind")]
    pub ws_bind: String,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Pairing session lifetime and sweeper cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairingConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Bearer token settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens.  Override via `RELAY_JWT_SECRET`.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u64,
}

/// Listing page sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_http_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_ws_bind() -> String {
    "0.0.0.0:5001".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_session_ttl_secs() -> u64 {
    relay_core::domain::session::DEFAULT_SESSION_TTL_SECS
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_jwt_secret() -> String {
    "dev-only-notify-relay-secret-change-me".to_string()
}
fn default_token_ttl_days() -> u64 {
    30
}
fn default_page_size() -> usize {
    20
}
fn default_max_page_size() -> usize {
    100
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            http_bind: default_http_bind(),
            ws_bind: default_ws_bind(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PairingConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        // chrono panics above i64::MAX milliseconds
        let secs = self.session_ttl_secs.min(i64::MAX as u64 / 1000) as i64;
        chrono::Duration::seconds(secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        let days = self.token_ttl_days.min(i64::MAX as u64 / 86_400_000) as i64;
        chrono::Duration::days(days)
    }
}

impl ServerConfig {
    /// Rejects values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pairing.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "pairing.session_ttl_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pairing.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "pairing.sweep_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.jwt_secret",
                reason: "must not be empty".to_string(),
            });
        }
        if self.notifications.default_page_size == 0
            || self.notifications.default_page_size > self.notifications.max_page_size
        {
            return Err(ConfigError::Invalid {
                field: "notifications.default_page_size",
                reason: format!(
                    "must be between 1 and max_page_size ({})",
                    self.notifications.max_page_size
                ),
            });
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `ServerConfig` from `path`, returning `ServerConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory for Notify-Relay.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("NotifyRelay"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("notify-relay"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("NotifyRelay")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

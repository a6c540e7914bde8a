//! Configuration for the parser.
//!
//! Configuration can be read from `~/.config/cleanweb/config.toml`; any
//! missing field falls back to its default. `BROWSER_CONTROL_URL` overrides
//! the browser endpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::OutputFormat;
use crate::fetcher::{ClientProfile, RetrievalMode};

/// Environment variable holding the DevTools endpoint of a running browser
pub const BROWSER_CONTROL_URL_ENV: &str = "BROWSER_CONTROL_URL";

/// Endpoint used when browser mode is selected and nothing else is configured
pub const DEFAULT_BROWSER_ENDPOINT: &str = "ws://localhost:3000";

/// Parser configuration. Immutable once a [`Parser`](crate::Parser) is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// How raw markup is retrieved (default: direct)
    pub mode: RetrievalMode,

    /// Per-request timeout in seconds (default: 60)
    pub timeout_secs: u64,

    /// Per-request timeout in milliseconds; overrides `timeout_secs` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Default output format for `parse_markup` (default: html)
    pub format: OutputFormat,

    /// Client identity presented by direct fetches (default: chrome)
    pub profile: ClientProfile,

    /// Treat non-2xx responses from direct fetches as failures (default: false)
    pub reject_error_status: bool,

    pub browser: BrowserSettings,

    pub cache: CacheSettings,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Direct,
            timeout_secs: 60,
            timeout_ms: None,
            format: OutputFormat::Html,
            profile: ClientProfile::default(),
            reject_error_status: false,
            browser: BrowserSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl ParserConfig {
    /// Get the request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.timeout_secs),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ParserConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the default path, or defaults if no file exists there.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the default config file path: `~/.config/cleanweb/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("cleanweb").join("config.toml"))
    }

    /// Apply `BROWSER_CONTROL_URL` if it is set.
    pub fn apply_env(mut self) -> Self {
        if let Some(endpoint) = env_browser_endpoint() {
            self.browser.endpoint = Some(endpoint);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout().is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.cleanup_interval_secs must be positive".into(),
            ));
        }
        if let Some(ref endpoint) = self.browser.endpoint {
            validate_endpoint(endpoint)?;
        }
        Ok(())
    }
}

/// Settings for browser retrieval
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// DevTools endpoint, e.g. `ws://localhost:3000`
    pub endpoint: Option<String>,
}

impl BrowserSettings {
    /// Configured endpoint, then `BROWSER_CONTROL_URL`, then the local default.
    pub fn resolve_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .or_else(env_browser_endpoint)
            .unwrap_or_else(|| DEFAULT_BROWSER_ENDPOINT.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
    Disabled,
}

/// Settings for the result cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,

    /// Entry lifetime in seconds (default: 24h)
    pub ttl_secs: u64,

    /// Interval between expired-entry sweeps in seconds (default: 7d)
    pub cleanup_interval_secs: u64,

    /// Database file for the sqlite backend
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_secs: 24 * 60 * 60,
            cleanup_interval_secs: 7 * 24 * 60 * 60,
            path: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Configured database path, or `<cache_dir>/cleanweb/cache.db`
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.path {
            return Ok(path.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::NoCacheDir)?;
        Ok(cache_dir.join("cleanweb").join("cache.db"))
    }
}

fn env_browser_endpoint() -> Option<String> {
    std::env::var(BROWSER_CONTROL_URL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::Invalid(format!("browser endpoint {}: {}", endpoint, e)))?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "browser endpoint {} has unsupported scheme '{}'",
            endpoint, other
        ))),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine cache directory")]
    NoCacheDir,

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

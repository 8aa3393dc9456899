//! AskHuman configuration types and loading

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Well-known port the primary instance listens on
pub const DEFAULT_PORT: u16 = 56234;

/// Main AskHuman configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Shared HTTP endpoint
    pub server: ServerConfig,

    /// Request store location
    pub storage: StorageConfig,

    /// Secondary-side polling
    pub remote: RemoteConfig,

    /// Notification broker
    pub broker: BrokerConfig,

    /// Browser launch
    pub browser: BrowserConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .askhuman.yml
        let local_config = PathBuf::from(".askhuman.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/askhuman/askhuman.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are ignored; the full load later reports them properly.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load_quietly(config_path).and_then(|config| config.log_level)
    }

    /// Port the primary uses, for help output rendered before argument parsing
    pub fn load_port(config_path: Option<&PathBuf>) -> u16 {
        Self::load_quietly(config_path).map_or(DEFAULT_PORT, |config| config.server.port)
    }

    fn load_quietly(config_path: Option<&PathBuf>) -> Option<Self> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".askhuman.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };

        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("askhuman").join("askhuman.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Address the primary binds
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .context(format!("Invalid listen address {}:{}", self.server.host, self.server.port))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Base URL of the shared UI and API
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.server.port)
    }

    /// URL secondaries and CLI commands use to reach the primary's API
    pub fn api_url(&self) -> String {
        match self.server.host.as_str() {
            "0.0.0.0" | "::" => format!("http://127.0.0.1:{}", self.server.port),
            host if host.contains(':') => format!("http://[{}]:{}", host, self.server.port),
            host => format!("http://{}:{}", host, self.server.port),
        }
    }
}

/// Shared HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Well-known coordination port
    pub port: u16,

    /// Health probe timeout in milliseconds
    #[serde(rename = "probe-timeout-ms")]
    pub probe_timeout_ms: u64,

    /// Directory with the UI asset bundle; a built-in page is served when unset
    #[serde(rename = "ui-dir")]
    pub ui_dir: Option<PathBuf>,

    /// Interval between SSE keep-alive comments
    #[serde(rename = "sse-keepalive-secs")]
    pub sse_keepalive_secs: u64,
}

impl ServerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            probe_timeout_ms: 2_000,
            ui_dir: None,
            sse_keepalive_secs: 15,
        }
    }
}

/// Request store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".askhuman")
            .join("app.db");
        Self { db_path }
    }
}

/// Secondary-side polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Delay between poll attempts in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Per-attempt request timeout in milliseconds
    #[serde(rename = "poll-timeout-ms")]
    pub poll_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            poll_timeout_ms: 5_000,
        }
    }
}

/// Notification broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Per-subscriber mailbox size
    #[serde(rename = "mailbox-capacity")]
    pub mailbox_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { mailbox_capacity: 16 }
    }
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Open the UI on the first question asked by this process
    #[serde(rename = "open-on-first-ask")]
    pub open_on_first_ask: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self { open_on_first_ask: true }
    }
}

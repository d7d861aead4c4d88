//! Configuration loading for workspace-sync.
//!
//! Configuration is loaded from a TOML file (default: `wsync.toml`). Every
//! field has a default, so an empty file (or no file at all) watches the
//! current directory and signals on port 50000.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_channel::TcpProviderConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "wsync.toml";

/// Root configuration for both ends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// What the local end watches.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Where the offer/answer exchange happens.
    #[serde(default)]
    pub signaling: SignalingConfig,
    /// Peer channel settings shared by both ends.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Where the remote end writes.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Local watch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Directories to watch, walked in order (default: `./`).
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    /// Substring patterns; matching paths are never watched (default: `.git`).
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

/// Signaling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalingConfig {
    /// Address of the signaling endpoint (default: `:50000`).
    ///
    /// The remote end binds it, the local end posts its offer to it. A bare
    /// `:port` means all interfaces when binding and loopback when dialing.
    #[serde(default = "default_signaling_address")]
    pub address: String,
}

/// Peer channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Channel label; both ends must use the same one (default: `workspace-sync`).
    #[serde(default = "default_channel_name")]
    pub name: String,
    /// Where the remote end listens for the data channel (default: `0.0.0.0:0`).
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Host the remote end advertises in its answer.
    pub advertise_host: Option<String>,
    /// Local end connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Remote apply configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Directory event paths are resolved against (default: `.`).
    #[serde(default = "default_remote_root")]
    pub root: PathBuf,
}

// Default value functions
fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("./")]
}

fn default_ignore() -> Vec<String> {
    vec![".git".to_string()]
}

fn default_signaling_address() -> String {
    ":50000".to_string()
}

fn default_channel_name() -> String {
    "workspace-sync".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:0".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_remote_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            ignore: default_ignore(),
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            address: default_signaling_address(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            listen_address: default_listen_address(),
            advertise_host: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            root: default_remote_root(),
        }
    }
}

impl SignalingConfig {
    /// URL the local end posts its offer to.
    pub fn dial_url(&self) -> String {
        let address = self.address.trim();
        if address.starts_with("http://") || address.starts_with("https://") {
            return address.to_string();
        }
        if address.starts_with(':') {
            format!("http://127.0.0.1{}/", address)
        } else {
            format!("http://{}/", address)
        }
    }

    /// Host part of [`dial_url`](Self::dial_url).
    pub fn dial_host(&self) -> Option<String> {
        reqwest::Url::parse(&self.dial_url())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// Socket address the remote end binds.
    pub fn bind_address(&self) -> String {
        let address = self
            .address
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        if address.starts_with(':') {
            format!("0.0.0.0{}", address)
        } else {
            address.to_string()
        }
    }
}

impl ChannelConfig {
    /// Settings for the TCP channel provider.
    pub fn provider_config(&self) -> TcpProviderConfig {
        TcpProviderConfig {
            channel: self.name.clone(),
            listen_address: self.listen_address.clone(),
            advertise_host: self.advertise_host.clone(),
            peer_host: None,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

impl Config {
    /// Provider settings for the local end.
    ///
    /// An answer advertising a wildcard address is dialed at the host the
    /// offer was signaled to.
    pub fn local_provider_config(&self) -> TcpProviderConfig {
        TcpProviderConfig {
            peer_host: self.signaling.dial_host(),
            ..self.channel.provider_config()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load an explicitly named file, or `wsync.toml` if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

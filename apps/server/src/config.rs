//! Daemon configuration.
//!
//! Stored as TOML. The path comes from the first command-line argument or
//! `FILESTREAM_CONFIG`; without either, defaults are used. A missing file
//! at an explicit path is created with defaults, and a file without a
//! token gets a generated one written back. `FILESTREAM_TOKEN` overrides
//! the configured token.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use filestream_server::ServerConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FILESTREAM_CONFIG";

/// Environment variable overriding the bearer token.
pub const TOKEN_ENV: &str = "FILESTREAM_TOKEN";

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Directory whose files are served.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Bearer token clients must present. Empty until generated.
    #[serde(default)]
    pub token: String,

    /// Maximum bytes per download message.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Pause between download messages, in milliseconds.
    #[serde(default)]
    pub chunk_interval_ms: u64,

    /// Messages buffered per channel direction.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_bind_addr() -> SocketAddr {
    ServerConfig::default().bind_addr
}

fn default_storage_root() -> PathBuf {
    ServerConfig::default().storage_root
}

fn default_max_chunk_size() -> usize {
    ServerConfig::default().max_chunk_size
}

fn default_channel_capacity() -> usize {
    ServerConfig::default().channel_capacity
}

/// Generates a random token as a 32-character lowercase hex string.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            storage_root: default_storage_root(),
            token: generate_token(),
            max_chunk_size: default_max_chunk_size(),
            chunk_interval_ms: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or defaults without one.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let mut config = Self::read(path)?;
                if config.token.is_empty() && std::env::var_os(TOKEN_ENV).is_none() {
                    config.token = generate_token();
                    config.save(path)?;
                    tracing::warn!(
                        path = %path.display(),
                        token = %config.token,
                        "configuration had no token, saved a generated one"
                    );
                }
                config
            }
            Some(path) => {
                let config = Config::default();
                config.save(path)?;
                tracing::info!(path = %path.display(), "wrote default configuration");
                config
            }
            None => {
                let config = Config::default();
                if std::env::var_os(TOKEN_ENV).is_none() {
                    tracing::warn!(
                        token = %config.token,
                        "no configuration file, using a generated token"
                    );
                }
                config
            }
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.token = token;
        }
        Ok(config)
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Writes the configuration to `path`, readable by the owner only.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind_addr,
            storage_root: self.storage_root.clone(),
            token: self.token.clone(),
            max_chunk_size: self.max_chunk_size,
            chunk_interval: Duration::from_millis(self.chunk_interval_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Picks the configuration path: the CLI argument, then `FILESTREAM_CONFIG`.
pub fn config_path_from(arg: Option<OsString>) -> Option<PathBuf> {
    arg.or_else(|| std::env::var_os(CONFIG_ENV))
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

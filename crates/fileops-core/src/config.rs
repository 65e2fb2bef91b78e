//! Configuration for the fileops server and client.
//!
//! Server resolution order: environment variables → config file → defaults.
//!
//! Server config file location:
//!   1. $FILEOPS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/fileops/server.toml
//!   3. ~/.config/fileops/server.toml
//!
//! The client reads a JSON transfer profile (`addr`, `path`, `offset`,
//! `blocksize`, `size`, `stream`, `codec`) named on its command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::wire::{CodecId, DEFAULT_API_PORT, DEFAULT_BLOCK_SIZE, DEFAULT_PORT, MAX_BLOCK_SIZE};

// ── Server ────────────────────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the file service listens on.
    pub listen_addr: String,
    /// Port for the HTTP status API on 127.0.0.1.
    pub api_port: u16,
    pub api_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Requested paths resolve under this directory. Empty = no confinement.
    pub root_dir: PathBuf,
    /// Largest block a client may ask for. Capped at MAX_BLOCK_SIZE.
    pub max_block_size: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            api_port: DEFAULT_API_PORT,
            api_enabled: true,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl FilesConfig {
    pub fn root(&self) -> Option<&Path> {
        if self.root_dir.as_os_str().is_empty() {
            None
        } else {
            Some(&self.root_dir)
        }
    }

    pub fn effective_max_block_size(&self) -> u64 {
        match self.max_block_size {
            0 => MAX_BLOCK_SIZE,
            n => n.min(MAX_BLOCK_SIZE),
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// One client transfer, as read from a JSON profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// Path of the file on the server.
    pub path: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(rename = "blocksize", default = "default_block_size")]
    pub block_size: u64,
    /// Bytes to read. Absent or 0 = ask the server for the file size.
    #[serde(default)]
    pub size: Option<u64>,
    /// Streaming transfer instead of one call per block.
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_codec")]
    pub codec: CodecId,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_codec() -> CodecId {
    CodecId::Binary
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            path: path.into(),
            offset: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            size: None,
            stream: false,
            codec: default_codec(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::JsonParseFailed(path.to_path_buf(), e))
    }

    /// Size to transfer, treating an explicit 0 like an absent size.
    pub fn requested_size(&self) -> Option<u64> {
        self.size.filter(|s| *s > 0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("addr must not be empty".into()));
        }
        if self.path.trim().is_empty() {
            return Err(ConfigError::Invalid("path must not be empty".into()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("blocksize must be positive".into()));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "blocksize {} exceeds maximum {}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("fileops")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to parse {0}: {1}")]
    JsonParseFailed(PathBuf, serde_json::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file (defaults when it does not exist), then
    /// apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            ServerConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("FILEOPS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("server.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing(path: &Path) -> Result<PathBuf, ConfigError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
            }
            let text = toml::to_string_pretty(&ServerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        Ok(path.to_path_buf())
    }

    /// Apply FILEOPS_* overrides, looked up through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FILEOPS_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = var("FILEOPS_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Some(v) = var("FILEOPS_NETWORK__API_ENABLED") {
            self.network.api_enabled = v == "true" || v == "1";
        }
        if let Some(v) = var("FILEOPS_FILES__ROOT_DIR") {
            self.files.root_dir = PathBuf::from(v);
        }
    }
}

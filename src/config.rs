//! Configuration for the client and server sides.
//!
//! Both are plain TOML files; every field has a default so an empty file is
//! a valid configuration.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Data chunk size for transfer
pub const DATA_CHUNK_SIZE: usize = 256 * 1024; // 256KB

pub const DEFAULT_PORT: u16 = 38067;

fn default_server() -> String {
    format!("127.0.0.1:{}", DEFAULT_PORT)
}

fn default_bind() -> String {
    format!("0.0.0.0:{}", DEFAULT_PORT)
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_chunk_size() -> usize {
    DATA_CHUNK_SIZE
}

fn default_directories() -> Vec<String> {
    vec!["mods".to_string(), "config".to_string()]
}

/// Knobs consumed by the transfer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Upper bound on bytes read per chunk (and per progress report)
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DATA_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Server address (host:port)
    #[serde(default = "default_server")]
    pub server: String,
    /// Local directory the managed files live under
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            root: default_root(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SyncError::Config("chunk_size must be positive".into()));
        }
        Ok(())
    }

    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory the managed directories are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_directories")]
    pub directories: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            root: default_root(),
            directories: default_directories(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))
    }
}

fn load_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("reading {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| SyncError::Config(format!("parsing {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_client_config_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.transfer().chunk_size, DATA_CHUNK_SIZE);
    }

    #[test]
    fn test_client_config_fields() {
        let config = ClientConfig::from_toml_str(
            r#"
            server = "mc.example.org:38067"
            root = "/srv/minecraft"
            chunk_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.server, "mc.example.org:38067");
        assert_eq!(config.root, PathBuf::from("/srv/minecraft"));
        assert_eq!(config.transfer().chunk_size, 4096);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = ClientConfig::from_toml_str("chunk_size = 0").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ClientConfig::from_toml_str("sever = \"typo\"").is_err());
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::from_toml_str("root = \"/srv\"").unwrap();
        assert_eq!(config.directories, vec!["mods", "config"]);
        assert_eq!(config.root, PathBuf::from("/srv"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/serversync.toml")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}

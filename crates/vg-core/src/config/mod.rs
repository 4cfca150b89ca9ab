//! Configuration management for Vigil

mod agent;
pub mod serde_utils;

pub use agent::{
    AgentConfig, BackgroundConfig, ProbeConfig, RelayConfig, DEFAULT_HTTP_PORT, DEFAULT_IPC_PORT,
};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vigil")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = load_config::<AgentConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "ipc_port = 40100\n\n[relay]\nenabled = true\n\n[background]\ninterval_ms = 2500\n",
        )
        .unwrap();

        let loaded: AgentConfig = load_config(&path).unwrap();
        let defaults = AgentConfig::default();
        assert_eq!(loaded.ipc_port, 40100);
        assert_eq!(loaded.http_port, defaults.http_port);
        assert!(loaded.relay.enabled);
        assert_eq!(loaded.relay.retry_delay, defaults.relay.retry_delay);
        assert_eq!(loaded.background.interval, std::time::Duration::from_millis(2500));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ipc_port = \"not a number\"").unwrap();

        let err = load_config::<AgentConfig>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

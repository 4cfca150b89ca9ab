//! Core error types for Vigil

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by the stepped scan orchestrator
///
/// Policy violations are not errors; they are reported as blocked outcomes.
#[derive(Error, Debug)]
pub enum ScanError {
    /// `start()` while a step is executing
    #[error("Scan already in progress")]
    AlreadyRunning,

    /// Retry requested for a step that is not blocked
    #[error("Scan is not blocked at step {step}")]
    NotBlocked { step: u8 },

    /// A detection provider failed or timed out
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The session was cancelled or replaced while a step was running
    #[error("Scan {0} was cancelled")]
    Cancelled(String),
}

/// Detection provider failures
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Provider call exceeded its time budget
    #[error("{provider} provider timed out after {timeout:?}")]
    Timeout {
        provider: &'static str,
        timeout: Duration,
    },

    /// Provider returned an error
    #[error("{provider} provider failed: {message}")]
    Failed {
        provider: &'static str,
        message: String,
    },

    /// No provider is available on this platform or configuration
    #[error("{0} provider is not available")]
    Unavailable(&'static str),
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Failed`]
    pub fn failed(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Failed {
            provider,
            message: message.into(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Signature file errors
#[derive(Error, Debug)]
pub enum SignatureError {
    /// Signature file not found
    #[error("Signature file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the signature file
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Signature file is not valid JSON
    #[error("Invalid signature file: {0}")]
    Parse(#[from] serde_json::Error),
}

//! Agent daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Default command server port (localhost only)
pub const DEFAULT_IPC_PORT: u16 = 22340;

/// Default ingress HTTP port (localhost only)
pub const DEFAULT_HTTP_PORT: u16 = 22341;

/// Configuration for the agent daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command server port on 127.0.0.1
    pub ipc_port: u16,

    /// Ingress HTTP port on 127.0.0.1
    pub http_port: u16,

    /// Time budget for each detection provider call made by the orchestrator
    #[serde(with = "duration_secs")]
    pub provider_timeout: Duration,

    /// How long one independent check waits for its counterpart
    #[serde(with = "duration_secs")]
    pub completion_window: Duration,

    /// JSON denylist of process names, ports and domains
    pub signatures_path: PathBuf,

    /// How often the signature file is re-read
    #[serde(with = "duration_secs")]
    pub signature_reload_interval: Duration,

    /// Periodic background scanning
    pub background: BackgroundConfig,

    /// Remote observer relay
    pub relay: RelayConfig,

    /// External platform probes
    pub probes: ProbeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ipc_port: DEFAULT_IPC_PORT,
            http_port: DEFAULT_HTTP_PORT,
            provider_timeout: Duration::from_secs(10),
            completion_window: Duration::from_secs(20),
            signatures_path: super::default_config_dir().join("signatures.json"),
            signature_reload_interval: Duration::from_secs(60),
            background: BackgroundConfig::default(),
            relay: RelayConfig::default(),
            probes: ProbeConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Get the command server address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }

    /// Get the ingress HTTP address (localhost:port)
    pub fn http_address(&self) -> String {
        format!("127.0.0.1:{}", self.http_port)
    }
}

/// Background scan loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Whether the loop runs at all
    pub enabled: bool,

    /// Delay between scans
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,

    /// Time budget for a single background scan
    #[serde(with = "duration_secs")]
    pub scan_timeout: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(30),
        }
    }
}

/// Remote relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Whether to connect to a remote observer
    pub enabled: bool,

    /// Remote endpoint (host:port)
    pub address: String,

    /// Fixed delay between reconnection attempts
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:22350".to_string(),
            retry_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// External probe commands
///
/// Each probe is an argv vector run without a shell. It must print one JSON
/// document on stdout: a notification audit or an exam-mode report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub notification_command: Option<Vec<String>>,
    pub exam_mode_command: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.ipc_address(), "127.0.0.1:22340");
        assert_eq!(config.http_address(), "127.0.0.1:22341");
        assert_eq!(config.completion_window, Duration::from_secs(20));
        assert!(config.background.enabled);
        assert!(!config.relay.enabled);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            ipc_port = 40000

            [background]
            interval_ms = 1000

            [relay]
            enabled = true
            address = "observer.example:9000"

            [probes]
            notification_command = ["/usr/local/bin/focus-probe", "--json"]
        "#;

        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ipc_port, 40000);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.background.interval, Duration::from_millis(1000));
        assert_eq!(config.background.scan_timeout, Duration::from_secs(30));
        assert_eq!(config.relay.address, "observer.example:9000");
        assert_eq!(config.relay.retry_delay, Duration::from_secs(5));
        assert_eq!(
            config.probes.notification_command.as_deref(),
            Some(&["/usr/local/bin/focus-probe".to_string(), "--json".to_string()][..])
        );
        assert!(config.probes.exam_mode_command.is_none());
    }
}

//! External probe commands
//!
//! Platform-specific state (Focus / Do Not Disturb, screen sharing) is read
//! by a helper executable that prints one JSON document on stdout. The
//! command is run without a shell.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;

use vg_core::config::ProbeConfig;
use vg_core::traits::{ExamModeProvider, ExamModeReport, NotificationAudit, NotificationProvider};
use vg_core::ProviderError;

/// Runs configured probe commands
#[derive(Debug, Clone, Default)]
pub struct ProbeCommandProvider {
    notification_command: Option<Vec<String>>,
    exam_mode_command: Option<Vec<String>>,
}

impl ProbeCommandProvider {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            notification_command: config.notification_command.clone(),
            exam_mode_command: config.exam_mode_command.clone(),
        }
    }

    pub fn notification_command(&self) -> Option<&[String]> {
        self.notification_command.as_deref()
    }

    pub fn exam_mode_command(&self) -> Option<&[String]> {
        self.exam_mode_command.as_deref()
    }
}

#[async_trait]
impl NotificationProvider for ProbeCommandProvider {
    async fn audit(&self) -> Result<NotificationAudit, ProviderError> {
        run_probe("notification", self.notification_command()).await
    }
}

#[async_trait]
impl ExamModeProvider for ProbeCommandProvider {
    async fn check(&self) -> Result<ExamModeReport, ProviderError> {
        run_probe("exam-mode", self.exam_mode_command()).await
    }
}

async fn run_probe<T: DeserializeOwned>(
    provider: &'static str,
    argv: Option<&[String]>,
) -> Result<T, ProviderError> {
    let (program, args) = argv
        .and_then(|argv| argv.split_first())
        .ok_or(ProviderError::Unavailable(provider))?;

    tracing::debug!("Running {} probe: {} {:?}", provider, program, args);
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProviderError::failed(provider, format!("failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(ProviderError::failed(
            provider,
            format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| ProviderError::failed(provider, format!("invalid probe output: {}", e)))
}

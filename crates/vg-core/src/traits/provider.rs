//! Detection provider contracts
//!
//! Providers probe the operating system. The orchestrator only sees their
//! inputs and outputs: an audit report for notification state and lists of
//! detections for security and exam-mode checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vg_protocol::{Detection, SystemReport};

use crate::error::ProviderError;
use crate::signatures::SignatureSet;

/// Notification and focus state reported by a [`NotificationProvider`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationAudit {
    /// Do-not-disturb / Focus is active
    pub focus_active: bool,
    /// Violations found during the audit (apps allowed to notify, etc.)
    pub detections: Vec<Detection>,
}

/// Result of an exam-mode check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamModeReport {
    pub threats: Vec<Detection>,
}

impl ExamModeReport {
    /// Whether the check found nothing suspicious
    pub fn is_clean(&self) -> bool {
        self.threats.is_empty()
    }
}

/// Audits notification and focus settings
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Run the audit
    async fn audit(&self) -> Result<NotificationAudit, ProviderError>;

    /// Platform pass/fail predicate for an audit
    fn evaluate(&self, audit: &NotificationAudit) -> bool {
        audit.focus_active && audit.detections.is_empty()
    }
}

/// Takes system snapshots and scans for disallowed software
#[async_trait]
pub trait SecurityProvider: Send + Sync {
    /// Process and load snapshot
    async fn system_snapshot(&self) -> Result<SystemReport, ProviderError>;

    /// Threats matching the given signature set
    async fn scan_threats(&self, signatures: &SignatureSet)
        -> Result<Vec<Detection>, ProviderError>;
}

/// Checks for screen-sharing or remote-control activity
#[async_trait]
pub trait ExamModeProvider: Send + Sync {
    async fn check(&self) -> Result<ExamModeReport, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_protocol::Severity;

    struct Audited(NotificationAudit);

    #[async_trait]
    impl NotificationProvider for Audited {
        async fn audit(&self) -> Result<NotificationAudit, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_default_predicate() {
        let clean = Audited(NotificationAudit {
            focus_active: true,
            detections: vec![],
        });
        let audit = clean.audit().await.unwrap();
        assert!(clean.evaluate(&audit));

        let focus_off = NotificationAudit::default();
        assert!(!clean.evaluate(&focus_off));

        let noisy = NotificationAudit {
            focus_active: true,
            detections: vec![Detection::new(
                "notifying_app",
                Severity::Medium,
                "Slack can show notifications",
            )],
        };
        assert!(!clean.evaluate(&noisy));
    }

    #[test]
    fn test_audit_json_shape() {
        let audit: NotificationAudit = serde_json::from_str(
            r#"{"focusActive":true,"detections":[{"type":"notifying_app","severity":"low","message":"x"}]}"#,
        )
        .unwrap();
        assert!(audit.focus_active);
        assert_eq!(audit.detections.len(), 1);

        let report: ExamModeReport = serde_json::from_str("{}").unwrap();
        assert!(report.is_clean());
    }
}

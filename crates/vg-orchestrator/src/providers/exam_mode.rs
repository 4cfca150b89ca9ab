//! Exam-mode check from the signature set

use std::sync::Arc;

use async_trait::async_trait;

use vg_core::traits::{ExamModeProvider, ExamModeReport, SecurityProvider};
use vg_core::{ProviderError, SignatureStore};

/// Treats any running denylisted process as an exam-mode violation
pub struct SignatureExamMode {
    security: Arc<dyn SecurityProvider>,
    signatures: Arc<SignatureStore>,
}

impl SignatureExamMode {
    pub fn new(security: Arc<dyn SecurityProvider>, signatures: Arc<SignatureStore>) -> Self {
        Self {
            security,
            signatures,
        }
    }
}

#[async_trait]
impl ExamModeProvider for SignatureExamMode {
    async fn check(&self) -> Result<ExamModeReport, ProviderError> {
        let signatures = self.signatures.snapshot();
        let threats = self.security.scan_threats(&signatures).await?;
        Ok(ExamModeReport { threats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{threat, MockSecurity};
    use vg_core::SignatureSet;

    #[tokio::test]
    async fn test_threats_become_report() {
        let security = MockSecurity::new(vec![threat("anydesk")]);
        let exam_mode = SignatureExamMode::new(
            security,
            Arc::new(SignatureStore::new(SignatureSet::default())),
        );

        let report = exam_mode.check().await.unwrap();
        assert_eq!(report.threats.len(), 1);
        assert!(!report.is_clean());
    }
}

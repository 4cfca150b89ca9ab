//! Independent notification and exam-mode checks
//!
//! Unlike the stepped scan these checks are triggered one at a time by the
//! UI. Each feeds the [`SequentialCompletion`] coordinator and reports a
//! violation on the bus.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use vg_core::traits::{ExamModeProvider, NotificationProvider};
use vg_core::ProviderError;
use vg_protocol::{names, Detection};

use crate::bus::EventBus;
use crate::completion::SequentialCompletion;

/// Result of one independent check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub check: &'static str,
    pub passed: bool,
    pub detections: Vec<Detection>,
    /// This check completed the pair and `NO_ISSUES_DETECTED` was published
    pub confirmed: bool,
}

pub struct CheckRunner {
    notifications: Arc<dyn NotificationProvider>,
    exam_mode: Arc<dyn ExamModeProvider>,
    completion: Arc<SequentialCompletion>,
    bus: Arc<EventBus>,
    timeout: Duration,
}

impl CheckRunner {
    pub fn new(
        notifications: Arc<dyn NotificationProvider>,
        exam_mode: Arc<dyn ExamModeProvider>,
        completion: Arc<SequentialCompletion>,
        bus: Arc<EventBus>,
        timeout: Duration,
    ) -> Self {
        Self {
            notifications,
            exam_mode,
            completion,
            bus,
            timeout,
        }
    }

    /// Audit notification settings
    pub async fn run_notification_check(&self) -> Result<CheckOutcome, ProviderError> {
        let audit = match self.guarded("notification", self.notifications.audit()).await {
            Ok(audit) => audit,
            Err(e) => {
                self.completion.clear();
                return Err(e);
            }
        };

        let passed = self.notifications.evaluate(&audit);
        let confirmed = if passed {
            self.completion.mark_notif_complete()
        } else {
            self.completion.clear();
            tracing::info!("Notification check failed ({} issues)", audit.detections.len());
            self.bus.publish_event(
                names::ACTIVE_NOTIFICATION_SERVICE,
                Some(json!({
                    "source": "notification_check",
                    "focusActive": audit.focus_active,
                    "detections": audit.detections,
                })),
            );
            false
        };

        Ok(CheckOutcome {
            check: "notifications",
            passed,
            detections: audit.detections,
            confirmed,
        })
    }

    /// Look for screen sharing or remote control
    pub async fn run_exam_mode_check(&self) -> Result<CheckOutcome, ProviderError> {
        let report = match self.guarded("exam-mode", self.exam_mode.check()).await {
            Ok(report) => report,
            Err(e) => {
                self.completion.clear();
                return Err(e);
            }
        };

        let passed = report.is_clean();
        let confirmed = if passed {
            self.completion.mark_suspicious_complete()
        } else {
            self.completion.clear();
            tracing::info!("Exam-mode check found {} threats", report.threats.len());
            self.bus.publish_event(
                names::DETECTED_UNWANTED_APPS,
                Some(json!({
                    "source": "exam_mode_check",
                    "detections": report.threats,
                })),
            );
            false
        };

        Ok(CheckOutcome {
            check: "exam-mode",
            passed,
            detections: report.threats,
            confirmed,
        })
    }

    async fn guarded<T>(
        &self,
        provider: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout {
                provider,
                timeout: self.timeout,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::DEFAULT_COMPLETION_WINDOW;
    use crate::testing::*;

    struct Harness {
        runner: CheckRunner,
        notifications: Arc<MockNotifications>,
        exam_mode: Arc<MockExamMode>,
        completion: Arc<SequentialCompletion>,
        bus: Arc<EventBus>,
    }

    fn harness() -> Harness {
        let bus = Arc::new(EventBus::new());
        let notifications = MockNotifications::new(clean_audit());
        let exam_mode = MockExamMode::new(vec![]);
        let completion = Arc::new(SequentialCompletion::new(
            Arc::clone(&bus),
            DEFAULT_COMPLETION_WINDOW,
        ));
        let runner = CheckRunner::new(
            notifications.clone(),
            exam_mode.clone(),
            Arc::clone(&completion),
            Arc::clone(&bus),
            Duration::from_secs(5),
        );
        Harness {
            runner,
            notifications,
            exam_mode,
            completion,
            bus,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_checks_confirm_clean_state() {
        let h = harness();
        let (_sub, seen) = record(&h.bus);

        let first = h.runner.run_notification_check().await.unwrap();
        assert!(first.passed);
        assert!(!first.confirmed);

        let second = h.runner.run_exam_mode_check().await.unwrap();
        assert!(second.confirmed);
        assert_eq!(names_of(&seen), vec![names::NO_ISSUES_DETECTED]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_violation_clears_and_publishes() {
        let h = harness();
        let (_sub, seen) = record(&h.bus);

        h.runner.run_notification_check().await.unwrap();
        assert!(h.completion.pending().notif_complete);

        let h_exam = MockExamMode::new(vec![threat("obs")]);
        let runner = CheckRunner::new(
            h.notifications.clone(),
            h_exam,
            Arc::clone(&h.completion),
            Arc::clone(&h.bus),
            Duration::from_secs(5),
        );
        let outcome = runner.run_exam_mode_check().await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.detections.len(), 1);

        assert!(!h.completion.pending().notif_complete);
        assert_eq!(names_of(&seen), vec![names::DETECTED_UNWANTED_APPS]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_violation_publishes_active_service() {
        let h = harness();
        h.notifications.set_audit(noisy_audit());
        let (_sub, seen) = record(&h.bus);

        let outcome = h.runner.run_notification_check().await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(names_of(&seen), vec![names::ACTIVE_NOTIFICATION_SERVICE]);
        assert_eq!(seen.lock()[0].payload["focusActive"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_clears_pending() {
        let h = harness();
        h.runner.run_notification_check().await.unwrap();

        h.exam_mode.fail_with(ProviderError::Unavailable("exam-mode"));
        assert!(h.runner.run_exam_mode_check().await.is_err());
        assert!(!h.completion.pending().notif_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out() {
        let h = harness();
        h.notifications.set_delay(Some(Duration::from_secs(30)));

        let err = h.runner.run_notification_check().await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }
}

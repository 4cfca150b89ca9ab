//! Stepped scan state machine

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use vg_core::time::{current_time_millis, elapsed_millis};
use vg_core::traits::{NotificationAudit, NotificationProvider, SecurityProvider};
use vg_core::{ProviderError, ScanError, SignatureStore};
use vg_protocol::{
    names, Detection, DetectionBucket, ScanId, ScanReport, ScanSession, ScanState, ScanStatus,
    Severity, StepOutcome, SystemReport,
};

use crate::bus::EventBus;

const STEP1_BLOCKED_MESSAGE: &str =
    "Notifications must be silenced before the session can continue";
const STEP2_BLOCKED_MESSAGE: &str =
    "Disallowed applications must be closed before the session can continue";

/// Mutable scan bookkeeping, guarded by one lock
#[derive(Debug, Default)]
struct ScanInner {
    state: ScanState,
    session: Option<ScanSession>,
    detections: DetectionBucket,
}

impl ScanInner {
    fn owns(&self, id: &ScanId) -> bool {
        self.session.as_ref().map(|s| &s.id) == Some(id)
    }
}

/// Runs the two-step compliance scan and tracks its state
///
/// Only one scan is active at a time. The state lock is never held across
/// a provider call or a bus publish.
pub struct ScanOrchestrator {
    notifications: Arc<dyn NotificationProvider>,
    security: Arc<dyn SecurityProvider>,
    signatures: Arc<SignatureStore>,
    bus: Arc<EventBus>,
    provider_timeout: Duration,
    inner: Mutex<ScanInner>,
}

impl ScanOrchestrator {
    /// Create an idle orchestrator
    pub fn new(
        notifications: Arc<dyn NotificationProvider>,
        security: Arc<dyn SecurityProvider>,
        signatures: Arc<SignatureStore>,
        bus: Arc<EventBus>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            notifications,
            security,
            signatures,
            bus,
            provider_timeout,
            inner: Mutex::new(ScanInner::default()),
        }
    }

    /// Begin a new scan and run it until it blocks or completes
    pub async fn start(&self) -> Result<StepOutcome, ScanError> {
        let session = {
            let mut inner = self.inner.lock();
            if !inner.state.can_start() {
                return Err(ScanError::AlreadyRunning);
            }
            let session = ScanSession::new(current_time_millis());
            inner.session = Some(session.clone());
            inner.detections.clear();
            inner.state = ScanState::Step1Notification;
            session
        };

        tracing::info!("Stepped scan {} started", session.id);
        self.bus.publish_stage(
            names::STEPPED_SCAN_STARTED,
            Some(json!({ "scanId": session.id, "startTime": session.start_time })),
        );

        self.execute_step1(&session.id).await
    }

    /// Re-run the notification audit after the operator fixed step 1
    pub async fn retry_step1(&self) -> Result<StepOutcome, ScanError> {
        let id = self.begin_retry(1, ScanState::Step1Blocked, ScanState::Step1Notification)?;
        tracing::info!("Retrying step 1 of scan {}", id);
        self.execute_step1(&id).await
    }

    /// Re-run the security scan after the operator fixed step 2
    pub async fn retry_step2(&self) -> Result<StepOutcome, ScanError> {
        let id = self.begin_retry(2, ScanState::Step2Blocked, ScanState::Step2Security)?;
        tracing::info!("Retrying step 2 of scan {}", id);
        self.execute_step2(&id).await
    }

    /// Snapshot of the current state; no side effects
    pub fn get_scan_status(&self) -> ScanStatus {
        let inner = self.inner.lock();
        ScanStatus {
            scan_active: inner.session.is_some(),
            scan_id: inner.session.as_ref().map(|s| s.id.to_string()),
            state: inner.state,
            current_step: inner.session.as_ref().map(|s| s.current_step),
            detections: inner.detections.clone(),
            can_start_new_scan: inner.state.can_start(),
            is_blocked: inner.state.is_blocked(),
            is_completed: inner.state == ScanState::Completed,
        }
    }

    /// Abandon the current scan
    ///
    /// A provider call already in flight keeps running; its result is
    /// discarded when it arrives.
    pub fn cancel_scan(&self) -> ScanStatus {
        let previous = self.return_to_idle();
        if let Some(session) = previous {
            tracing::info!("Stepped scan {} cancelled", session.id);
            self.bus.publish_stage(
                names::STEPPED_SCAN_CANCELLED,
                Some(json!({ "scanId": session.id })),
            );
        }
        self.get_scan_status()
    }

    /// Return to `idle` unconditionally
    pub fn reset_scan(&self) -> ScanStatus {
        let previous = self.return_to_idle();
        tracing::info!(
            "Scan state reset{}",
            previous
                .as_ref()
                .map(|s| format!(" (dropped {})", s.id))
                .unwrap_or_default()
        );
        self.bus.publish_stage(
            names::SCAN_RESET,
            Some(json!({ "scanId": previous.map(|s| s.id) })),
        );
        self.get_scan_status()
    }

    fn return_to_idle(&self) -> Option<ScanSession> {
        let mut inner = self.inner.lock();
        inner.state = ScanState::Idle;
        inner.detections.clear();
        inner.session.take()
    }

    fn begin_retry(
        &self,
        step: u8,
        blocked: ScanState,
        running: ScanState,
    ) -> Result<ScanId, ScanError> {
        let mut inner = self.inner.lock();
        if inner.state != blocked {
            return Err(ScanError::NotBlocked { step });
        }
        let id = match inner.session.as_ref() {
            Some(session) => session.id.clone(),
            None => return Err(ScanError::NotBlocked { step }),
        };
        inner.state = running;
        Ok(id)
    }

    async fn execute_step1(&self, id: &ScanId) -> Result<StepOutcome, ScanError> {
        let audit = match self.guarded("notification", self.notifications.audit()).await {
            Ok(audit) => audit,
            Err(e) => return Err(self.fail_step(id, 1, e)),
        };

        if !self.notifications.evaluate(&audit) {
            let detections = blocking_detections(&audit);
            {
                let mut inner = self.inner.lock();
                if !inner.owns(id) {
                    return Err(ScanError::Cancelled(id.to_string()));
                }
                inner.state = ScanState::Step1Blocked;
                inner.detections.notifications = detections.clone();
            }

            tracing::info!(
                "Scan {} blocked at step 1 ({} notification issues)",
                id,
                detections.len()
            );
            self.bus.publish_stage(
                names::SCAN_STEP1_BLOCKED,
                Some(json!({ "scanId": id, "detections": detections })),
            );
            self.bus.publish_event(
                names::ACTIVE_NOTIFICATION_SERVICE,
                Some(json!({
                    "scanId": id,
                    "focusActive": audit.focus_active,
                    "detections": detections,
                })),
            );

            return Ok(StepOutcome::Blocked {
                step: 1,
                can_proceed: false,
                message: STEP1_BLOCKED_MESSAGE.to_string(),
                detections,
                system_report: None,
            });
        }

        {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                return Err(ScanError::Cancelled(id.to_string()));
            }
            inner.detections.notifications.clear();
            inner.state = ScanState::Step2Security;
            if let Some(session) = inner.session.as_mut() {
                session.current_step = 2;
            }
        }

        tracing::debug!("Scan {} passed step 1", id);
        self.bus
            .publish_stage(names::SCAN_STEP1_COMPLETED, Some(json!({ "scanId": id })));

        self.execute_step2(id).await
    }

    async fn execute_step2(&self, id: &ScanId) -> Result<StepOutcome, ScanError> {
        let signatures = self.signatures.snapshot();

        let joined = tokio::try_join!(
            self.guarded("security", self.security.system_snapshot()),
            self.guarded("security", self.security.scan_threats(&signatures)),
        );
        let (system_report, threats) = match joined {
            Ok(results) => results,
            Err(e) => return Err(self.fail_step(id, 2, e)),
        };

        if threats.is_empty() {
            {
                let mut inner = self.inner.lock();
                if !inner.owns(id) {
                    return Err(ScanError::Cancelled(id.to_string()));
                }
                inner.detections.security.clear();
            }
            return self.complete_scan(id, Some(system_report));
        }

        {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                return Err(ScanError::Cancelled(id.to_string()));
            }
            inner.state = ScanState::Step2Blocked;
            inner.detections.security = threats.clone();
        }

        tracing::info!("Scan {} blocked at step 2 ({} threats)", id, threats.len());
        self.bus.publish_stage(
            names::SCAN_STEP2_BLOCKED,
            Some(json!({ "scanId": id, "detections": threats })),
        );
        self.bus.publish_event(
            names::DETECTED_UNWANTED_APPS,
            Some(json!({
                "scanId": id,
                "source": "stepped_scan",
                "detections": threats,
            })),
        );

        Ok(StepOutcome::Blocked {
            step: 2,
            can_proceed: false,
            message: STEP2_BLOCKED_MESSAGE.to_string(),
            detections: threats,
            system_report: Some(system_report),
        })
    }

    fn complete_scan(
        &self,
        id: &ScanId,
        system_report: Option<SystemReport>,
    ) -> Result<StepOutcome, ScanError> {
        let report = {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                return Err(ScanError::Cancelled(id.to_string()));
            }
            let started_at = inner.session.take().map(|s| s.start_time).unwrap_or_default();
            inner.state = ScanState::Completed;
            ScanReport {
                scan_id: id.to_string(),
                started_at,
                completed_at: current_time_millis(),
                detections: inner.detections.clone(),
                summary: inner.detections.summary(),
                system_report,
            }
        };

        tracing::info!(
            "Stepped scan {} completed in {} ms",
            id,
            elapsed_millis(report.started_at)
        );
        self.bus.publish_event(
            names::NO_ISSUES_DETECTED,
            Some(json!({ "scanId": id, "summary": report.summary })),
        );
        self.bus.publish_stage(
            names::STEPPED_SCAN_COMPLETED,
            serde_json::to_value(&report).ok(),
        );

        Ok(StepOutcome::Completed { report })
    }

    /// Revert to `idle` after an infrastructure failure
    fn fail_step(&self, id: &ScanId, step: u8, error: ProviderError) -> ScanError {
        {
            let mut inner = self.inner.lock();
            if !inner.owns(id) {
                tracing::debug!("Ignoring provider failure from replaced scan {}", id);
                return ScanError::Cancelled(id.to_string());
            }
            inner.state = ScanState::Idle;
            inner.session = None;
            match step {
                1 => inner.detections.notifications.clear(),
                _ => inner.detections.security.clear(),
            }
        }

        tracing::warn!("Scan {} failed at step {}: {}", id, step, error);
        self.bus.publish_stage(
            names::STEPPED_SCAN_FAILED,
            Some(json!({ "scanId": id, "step": step, "error": error.to_string() })),
        );
        ScanError::Provider(error)
    }

    async fn guarded<T>(
        &self,
        provider: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider,
                timeout: self.provider_timeout,
            }),
        }
    }
}

/// Detections to store for a failed audit
///
/// A provider may reject an audit without listing anything (focus off and
/// nothing else wrong); record that as its own detection so the blocked
/// state always explains itself.
fn blocking_detections(audit: &NotificationAudit) -> Vec<Detection> {
    if !audit.detections.is_empty() {
        return audit.detections.clone();
    }
    let reason = if audit.focus_active {
        "Notification audit did not pass"
    } else {
        "Do Not Disturb / Focus is not active"
    };
    vec![Detection::new("focus_inactive", Severity::Medium, reason)]
}

//! Scriptable providers for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use vg_core::traits::{
    ExamModeProvider, ExamModeReport, NotificationAudit, NotificationProvider, SecurityProvider,
};
use vg_core::{ProviderError, SignatureSet};
use vg_protocol::{Detection, EventMessage, Severity, SystemReport};

use crate::bus::{EventBus, Subscription};

pub fn clean_audit() -> NotificationAudit {
    NotificationAudit {
        focus_active: true,
        detections: vec![],
    }
}

pub fn noisy_audit() -> NotificationAudit {
    NotificationAudit {
        focus_active: false,
        detections: vec![Detection::new(
            "notifying_app",
            Severity::Medium,
            "Messages can show notifications",
        )],
    }
}

pub fn threat(name: &str) -> Detection {
    Detection::new("unwanted_app", Severity::High, format!("{} is running", name))
        .with_detail("process", name)
}

pub struct MockNotifications {
    audit: Mutex<Result<NotificationAudit, ProviderError>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockNotifications {
    pub fn new(audit: NotificationAudit) -> Arc<Self> {
        Arc::new(Self {
            audit: Mutex::new(Ok(audit)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_audit(&self, audit: NotificationAudit) {
        *self.audit.lock() = Ok(audit);
    }

    pub fn fail_with(&self, error: ProviderError) {
        *self.audit.lock() = Err(error);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationProvider for MockNotifications {
    async fn audit(&self) -> Result<NotificationAudit, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.audit.lock().clone()
    }
}

pub struct MockSecurity {
    threats: Mutex<Result<Vec<Detection>, ProviderError>>,
    snapshot_error: Mutex<Option<ProviderError>>,
    delay: Mutex<Option<Duration>>,
    snapshot_calls: AtomicUsize,
    threat_calls: AtomicUsize,
}

impl MockSecurity {
    pub fn new(threats: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            threats: Mutex::new(Ok(threats)),
            snapshot_error: Mutex::new(None),
            delay: Mutex::new(None),
            snapshot_calls: AtomicUsize::new(0),
            threat_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_threats(&self, threats: Vec<Detection>) {
        *self.threats.lock() = Ok(threats);
    }

    pub fn fail_snapshot(&self, error: ProviderError) {
        *self.snapshot_error.lock() = Some(error);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst) + self.threat_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SecurityProvider for MockSecurity {
    async fn system_snapshot(&self) -> Result<SystemReport, ProviderError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.snapshot_error.lock().clone() {
            return Err(error);
        }
        Ok(SystemReport {
            hostname: "test-host".to_string(),
            process_count: 42,
            ..Default::default()
        })
    }

    async fn scan_threats(&self, _signatures: &SignatureSet) -> Result<Vec<Detection>, ProviderError> {
        self.threat_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.threats.lock().clone()
    }
}

pub struct MockExamMode {
    report: Mutex<Result<ExamModeReport, ProviderError>>,
}

impl MockExamMode {
    pub fn new(threats: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            report: Mutex::new(Ok(ExamModeReport { threats })),
        })
    }

    pub fn fail_with(&self, error: ProviderError) {
        *self.report.lock() = Err(error);
    }
}

#[async_trait]
impl ExamModeProvider for MockExamMode {
    async fn check(&self) -> Result<ExamModeReport, ProviderError> {
        self.report.lock().clone()
    }
}

/// Record every message published on a bus
pub fn record(bus: &Arc<EventBus>) -> (Subscription, Arc<Mutex<Vec<EventMessage>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = bus.subscribe(move |message| {
        sink.lock().push(message.clone());
        Ok(())
    });
    (subscription, seen)
}

/// Names of recorded messages, in order
pub fn names_of(seen: &Mutex<Vec<EventMessage>>) -> Vec<String> {
    seen.lock().iter().map(|m| m.name.clone()).collect()
}

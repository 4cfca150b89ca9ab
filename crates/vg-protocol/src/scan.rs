//! Scan data: detections, state machine states and reports

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Detection severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A single finding produced by a detection provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Free-form tag such as `unwanted_app` or `focus_disabled`
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    /// Provider-specific details
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Detection {
    /// Create a detection with no details
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Detections accumulated by the orchestrator for the active scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBucket {
    pub notifications: Vec<Detection>,
    pub security: Vec<Detection>,
}

impl DetectionBucket {
    /// Drop all detections
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.security.clear();
    }

    /// Total number of detections
    pub fn len(&self) -> usize {
        self.notifications.len() + self.security.len()
    }

    /// Whether the bucket holds no detections
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize detection counts
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            notification_issues: self.notifications.len(),
            security_threats: self.security.len(),
            total_issues: self.len(),
        }
    }
}

/// Stepped scan state machine
///
/// ```text
/// idle -start-> step1_notification -pass-> step2_security -pass-> completed
///                  |fail                       |fail
///                  v                           v
///              step1_blocked -retry->      step2_blocked -retry->
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    #[serde(rename = "step1_notification")]
    Step1Notification,
    #[serde(rename = "step1_blocked")]
    Step1Blocked,
    #[serde(rename = "step2_security")]
    Step2Security,
    #[serde(rename = "step2_blocked")]
    Step2Blocked,
    Completed,
}

impl ScanState {
    /// Whether a step is currently executing
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ScanState::Step1Notification | ScanState::Step2Security)
    }

    /// Whether the scan is waiting for remediation
    pub fn is_blocked(&self) -> bool {
        matches!(self, ScanState::Step1Blocked | ScanState::Step2Blocked)
    }

    /// Whether `start()` is allowed from this state
    pub fn can_start(&self) -> bool {
        !self.is_in_flight()
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanState::Idle => "idle",
            ScanState::Step1Notification => "step1_notification",
            ScanState::Step1Blocked => "step1_blocked",
            ScanState::Step2Security => "step2_security",
            ScanState::Step2Blocked => "step2_blocked",
            ScanState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Read-only view of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub scan_active: bool,
    pub scan_id: Option<String>,
    pub state: ScanState,
    pub current_step: Option<u8>,
    pub detections: DetectionBucket,
    pub can_start_new_scan: bool,
    pub is_blocked: bool,
    pub is_completed: bool,
}

/// Issue counts for a finished scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub notification_issues: usize,
    pub security_threats: usize,
    pub total_issues: usize,
}

/// Process and load snapshot taken by the security provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReport {
    /// Machine hostname
    pub hostname: String,
    /// Number of running processes
    pub process_count: usize,
    /// CPU usage percentage (0-100)
    pub cpu_percent: f32,
    /// Memory usage percentage (0-100)
    pub memory_percent: f32,
    /// System load average (1 minute)
    pub load_avg_1m: f32,
    /// Capture time in milliseconds since the Unix epoch
    pub captured_at: u64,
}

/// Full report published when a scan completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scan_id: String,
    pub started_at: u64,
    pub completed_at: u64,
    pub detections: DetectionBucket,
    pub summary: ScanSummary,
    pub system_report: Option<SystemReport>,
}

/// Result of running (or retrying) a scan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// A policy violation stopped the scan at `step`
    Blocked {
        step: u8,
        #[serde(rename = "canProceed")]
        can_proceed: bool,
        message: String,
        detections: Vec<Detection>,
        #[serde(rename = "systemReport")]
        system_report: Option<SystemReport>,
    },
    /// Both steps passed
    Completed { report: ScanReport },
}

impl StepOutcome {
    /// Whether the outcome is a block
    pub fn is_blocked(&self) -> bool {
        matches!(self, StepOutcome::Blocked { .. })
    }
}

//! Event messages carried by the in-process bus and the outbound transports
//!
//! Two kinds of message exist. `stage` messages are progress signals meant
//! for the local process only. `event` messages are the only kind that may
//! leave the process, and only when their name is in [`OUTBOUND_ALLOWLIST`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Well-known message names
pub mod names {
    /// A client connected to the command server
    pub const CLIENT_AND_APP_CONNECTED: &str = "CLIENT_AND_APP_CONNECTED";
    /// A client disconnected from the command server
    pub const CLIENT_AND_APP_DISCONNECTED: &str = "CLIENT_AND_APP_DISCONNECTED";
    /// Disallowed applications or remote-control tools were found
    pub const DETECTED_UNWANTED_APPS: &str = "DETECTED_UNWANTED_APPS";
    /// Notifications are not silenced (DND/Focus off or noisy background apps)
    pub const ACTIVE_NOTIFICATION_SERVICE: &str = "ACTIVE_NOTIFICATION_SERVICE";
    /// All checks passed
    pub const NO_ISSUES_DETECTED: &str = "NO_ISSUES_DETECTED";

    pub const STEPPED_SCAN_STARTED: &str = "STEPPED_SCAN_STARTED";
    pub const SCAN_STEP1_BLOCKED: &str = "SCAN_STEP1_BLOCKED";
    pub const SCAN_STEP1_COMPLETED: &str = "SCAN_STEP1_COMPLETED";
    pub const SCAN_STEP2_BLOCKED: &str = "SCAN_STEP2_BLOCKED";
    pub const STEPPED_SCAN_COMPLETED: &str = "STEPPED_SCAN_COMPLETED";
    pub const STEPPED_SCAN_FAILED: &str = "STEPPED_SCAN_FAILED";
    pub const STEPPED_SCAN_CANCELLED: &str = "STEPPED_SCAN_CANCELLED";
    pub const SCAN_RESET: &str = "SCAN_RESET";
}

/// Event names permitted to cross the process boundary
pub const OUTBOUND_ALLOWLIST: [&str; 5] = [
    names::CLIENT_AND_APP_CONNECTED,
    names::CLIENT_AND_APP_DISCONNECTED,
    names::DETECTED_UNWANTED_APPS,
    names::ACTIVE_NOTIFICATION_SERVICE,
    names::NO_ISSUES_DETECTED,
];

/// Check whether an event name is on the outbound allowlist
pub fn is_allowlisted(name: &str) -> bool {
    OUTBOUND_ALLOWLIST.contains(&name)
}

/// Message classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Internal progress signal, never forwarded externally
    Stage,
    /// Business event, eligible for external delivery
    Event,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Stage => write!(f, "stage"),
            EventKind::Event => write!(f, "event"),
        }
    }
}

/// A message published on the event bus
///
/// Constructed once at publish time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Message classification
    pub kind: EventKind,
    /// Message name (see [`names`])
    pub name: String,
    /// Opaque payload, `null` when absent
    #[serde(default)]
    pub payload: Value,
    /// Publish time in milliseconds since the Unix epoch
    pub ts: u64,
}

impl EventMessage {
    /// Create a message stamped with the given time
    pub fn new(kind: EventKind, name: impl Into<String>, payload: Option<Value>, ts: u64) -> Self {
        Self {
            kind,
            name: name.into(),
            payload: payload.unwrap_or(Value::Null),
            ts,
        }
    }

    /// Whether this message may be delivered outside the process
    pub fn is_outbound(&self) -> bool {
        self.kind == EventKind::Event && is_allowlisted(&self.name)
    }
}

//! Scan session identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one orchestrated scan run
///
/// Derived from the start timestamp plus a random suffix, e.g.
/// `scan-1700000000000-9f2c41ab`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(String);

impl ScanId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a scan starting at `started_at_millis`
    pub fn generate(started_at_millis: u64) -> Self {
        let suffix: [u8; 4] = rand::random();
        Self(format!("scan-{}-{}", started_at_millis, hex::encode(suffix)))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The single active scan run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    /// Session identifier
    pub id: ScanId,
    /// Start time in milliseconds since the Unix epoch
    pub start_time: u64,
    /// Step currently executing or blocked (1 or 2)
    pub current_step: u8,
}

impl ScanSession {
    /// Open a new session at step 1
    pub fn new(start_time: u64) -> Self {
        Self {
            id: ScanId::generate(start_time),
            start_time,
            current_step: 1,
        }
    }
}

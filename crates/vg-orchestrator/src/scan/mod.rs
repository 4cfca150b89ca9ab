//! Stepped compliance scan
//!
//! A scan runs the notification audit (step 1) and then the security scan
//! (step 2). A policy violation blocks the scan at that step until the
//! operator fixes it and retries; provider failures abort the scan.

mod orchestrator;

pub use orchestrator::ScanOrchestrator;

//! Sequential completion of the independent checks
//!
//! The notification check and the exam-mode check are triggered separately
//! (by the UI, over HTTP). A clean state is only confirmed when both report
//! success within one window of each other.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

use vg_protocol::names;

use crate::bus::EventBus;

/// Default time one check waits for its counterpart
pub const DEFAULT_COMPLETION_WINDOW: Duration = Duration::from_secs(20);

#[derive(Debug, Default)]
struct CompletionState {
    notif_complete: bool,
    suspicious_complete: bool,
    expiry: Option<JoinHandle<()>>,
    /// Bumped on every arm or clear; an expiry timer only acts on its own
    generation: u64,
}

impl CompletionState {
    fn reset(&mut self) {
        self.notif_complete = false;
        self.suspicious_complete = false;
        self.generation += 1;
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

/// Flags visible to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChecks {
    pub notif_complete: bool,
    pub suspicious_complete: bool,
    pub expiry_armed: bool,
}

/// Pairs successful notification and exam-mode checks
///
/// Publishes `NO_ISSUES_DETECTED` once per matched pair. Must be used from
/// within a Tokio runtime; the expiry timer is a spawned task.
pub struct SequentialCompletion {
    bus: Arc<EventBus>,
    window: Duration,
    state: Arc<Mutex<CompletionState>>,
}

impl SequentialCompletion {
    pub fn new(bus: Arc<EventBus>, window: Duration) -> Self {
        Self {
            bus,
            window,
            state: Arc::new(Mutex::new(CompletionState::default())),
        }
    }

    /// Record a passing notification check
    ///
    /// Returns `true` if this completed the pair.
    pub fn mark_notif_complete(&self) -> bool {
        self.mark(|state| state.notif_complete = true)
    }

    /// Record a passing exam-mode check
    ///
    /// Returns `true` if this completed the pair.
    pub fn mark_suspicious_complete(&self) -> bool {
        self.mark(|state| state.suspicious_complete = true)
    }

    /// Drop both flags and any pending expiry
    pub fn clear(&self) {
        self.state.lock().reset();
        tracing::debug!("Sequential completion cleared");
    }

    pub fn pending(&self) -> PendingChecks {
        let state = self.state.lock();
        PendingChecks {
            notif_complete: state.notif_complete,
            suspicious_complete: state.suspicious_complete,
            expiry_armed: state.expiry.is_some(),
        }
    }

    fn mark(&self, set: impl FnOnce(&mut CompletionState)) -> bool {
        let matched = {
            let mut state = self.state.lock();
            set(&mut state);
            if state.notif_complete && state.suspicious_complete {
                state.reset();
                true
            } else {
                self.arm(&mut state);
                false
            }
        };

        if matched {
            tracing::info!("Both checks passed, no issues detected");
            self.bus.publish_event(
                names::NO_ISSUES_DETECTED,
                Some(json!({ "source": "sequential_completion" })),
            );
        }
        matched
    }

    fn arm(&self, state: &mut CompletionState) {
        if let Some(timer) = state.expiry.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let window = self.window;

        state.expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut state = shared.lock();
            if state.generation != generation {
                return;
            }
            state.notif_complete = false;
            state.suspicious_complete = false;
            state.expiry = None;
            tracing::debug!("Sequential completion expired after {:?}", window);
        }));
    }
}

impl Drop for SequentialCompletion {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().expiry.take() {
            timer.abort();
        }
    }
}

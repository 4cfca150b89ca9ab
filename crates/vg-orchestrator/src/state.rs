//! Process-wide agent context

use std::sync::Arc;
use std::time::{Duration, Instant};

use vg_core::config::AgentConfig;
use vg_core::traits::{ExamModeProvider, NotificationProvider, SecurityProvider};
use vg_core::SignatureStore;

use crate::bus::EventBus;
use crate::checks::CheckRunner;
use crate::completion::SequentialCompletion;
use crate::scan::ScanOrchestrator;

/// Detection providers used by the orchestrator and the independent checks
#[derive(Clone)]
pub struct Providers {
    pub notifications: Arc<dyn NotificationProvider>,
    pub security: Arc<dyn SecurityProvider>,
    pub exam_mode: Arc<dyn ExamModeProvider>,
}

/// Shared state for the agent daemon
///
/// Built once at startup and handed to every server by `Arc`.
pub struct AgentContext {
    /// Configuration
    pub config: AgentConfig,
    /// Event bus
    pub bus: Arc<EventBus>,
    /// Current signature set
    pub signatures: Arc<SignatureStore>,
    /// Stepped scan state machine
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Pairs the independent checks
    pub completion: Arc<SequentialCompletion>,
    /// Independent check paths
    pub checks: Arc<CheckRunner>,
    started_at: Instant,
}

impl AgentContext {
    /// Wire up the bus, orchestrator and check paths
    pub fn new(config: AgentConfig, signatures: Arc<SignatureStore>, providers: Providers) -> Self {
        let bus = Arc::new(EventBus::new());

        let orchestrator = Arc::new(ScanOrchestrator::new(
            Arc::clone(&providers.notifications),
            Arc::clone(&providers.security),
            Arc::clone(&signatures),
            Arc::clone(&bus),
            config.provider_timeout,
        ));

        let completion = Arc::new(SequentialCompletion::new(
            Arc::clone(&bus),
            config.completion_window,
        ));

        let checks = Arc::new(CheckRunner::new(
            providers.notifications,
            providers.exam_mode,
            Arc::clone(&completion),
            Arc::clone(&bus),
            config.provider_timeout,
        ));

        Self {
            config,
            bus,
            signatures,
            orchestrator,
            completion,
            checks,
            started_at: Instant::now(),
        }
    }

    /// Time since the context was built
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

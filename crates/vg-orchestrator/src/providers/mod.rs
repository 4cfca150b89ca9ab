//! Reference detection providers
//!
//! Enough to run the daemon end to end: a `sysinfo`-backed security
//! provider, external probe commands for notification and exam-mode
//! state, and a signature-based exam-mode fallback.

mod exam_mode;
mod probe;
mod system;

pub use exam_mode::SignatureExamMode;
pub use probe::ProbeCommandProvider;
pub use system::SysinfoSecurityProvider;

use std::sync::Arc;

use vg_core::config::AgentConfig;
use vg_core::traits::ExamModeProvider;
use vg_core::SignatureStore;

use crate::state::Providers;

/// Pick providers for the given configuration
///
/// Exam-mode checks use the configured probe if there is one and fall back
/// to matching running processes against the signature set.
pub fn default_providers(config: &AgentConfig, signatures: Arc<SignatureStore>) -> Providers {
    let security = Arc::new(SysinfoSecurityProvider::new());
    let probes = Arc::new(ProbeCommandProvider::from_config(&config.probes));

    if probes.notification_command().is_none() {
        tracing::warn!("No notification probe configured; notification audits will fail");
    }

    let exam_mode: Arc<dyn ExamModeProvider> = if probes.exam_mode_command().is_some() {
        probes.clone()
    } else {
        Arc::new(SignatureExamMode::new(security.clone(), signatures))
    };

    Providers {
        notifications: probes,
        security,
        exam_mode,
    }
}

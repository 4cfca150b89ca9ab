//! vg-orchestrator: Local compliance monitoring daemon
//!
//! The daemon runs the stepped compliance scan, pairs the independent
//! notification and exam-mode checks, scans in the background on its own
//! thread and distributes allow-listed events to local clients and to a
//! remote observer.

pub mod background;
pub mod bus;
pub mod checks;
pub mod completion;
pub mod http;
pub mod ipc;
pub mod providers;
pub mod relay;
pub mod scan;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{EventBus, Subscription};
pub use scan::ScanOrchestrator;
pub use state::{AgentContext, Providers};

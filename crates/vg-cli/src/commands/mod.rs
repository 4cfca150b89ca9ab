//! CLI command implementations

mod health;
mod scan;
mod status;
mod watch;

pub use health::{check_command, health_command, CheckKind};
pub use scan::{cancel_command, reset_command, retry_command, start_command};
pub use status::status_command;
pub use watch::watch_command;

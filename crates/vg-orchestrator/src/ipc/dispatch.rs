//! Command dispatch to the orchestrator

use vg_core::ScanError;
use vg_protocol::{CommandAction, CommandResult, StepOutcome};

use crate::scan::ScanOrchestrator;

/// Run one command action and build its result
///
/// Unknown actions fail without touching the orchestrator.
pub async fn dispatch(orchestrator: &ScanOrchestrator, action: &str) -> CommandResult {
    let action = match action.parse::<CommandAction>() {
        Ok(action) => action,
        Err(e) => {
            tracing::debug!("Rejected command: {}", e);
            return CommandResult::failure(e.to_string());
        }
    };

    tracing::debug!("Dispatching {}", action);
    match action {
        CommandAction::StartSteppedScan => step_result(orchestrator.start().await),
        CommandAction::RetryStep1 => step_result(orchestrator.retry_step1().await),
        CommandAction::RetryStep2 => step_result(orchestrator.retry_step2().await),
        CommandAction::GetScanStatus => CommandResult::status(orchestrator.get_scan_status()),
        CommandAction::CancelScan => CommandResult::status(orchestrator.cancel_scan()),
        CommandAction::ResetScan => CommandResult::status(orchestrator.reset_scan()),
    }
}

fn step_result(result: Result<StepOutcome, ScanError>) -> CommandResult {
    match result {
        Ok(outcome) => CommandResult::outcome(outcome),
        Err(e) => CommandResult::failure(e.to_string()),
    }
}

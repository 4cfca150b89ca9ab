//! Stepped scan commands

use anyhow::Result;

use vg_protocol::{ScanStatus, StepOutcome};

use crate::ipc::AgentClient;
use crate::output::{format_outcome, print_error, print_info, print_success, print_warning};

/// Start a stepped scan and report where it stopped
pub async fn start_command(client: &mut AgentClient) -> Result<()> {
    print_info("Starting stepped scan...");
    match client.start_scan().await {
        Ok(outcome) => report_outcome(&outcome),
        Err(e) => {
            print_error(&format!("Failed to start scan: {}", e));
            Err(e)
        }
    }
}

/// Retry a blocked step after remediation
pub async fn retry_command(client: &mut AgentClient, step: u8) -> Result<()> {
    print_info(&format!("Retrying step {}...", step));
    match client.retry_step(step).await {
        Ok(outcome) => report_outcome(&outcome),
        Err(e) => {
            print_error(&format!("Failed to retry step {}: {}", step, e));
            Err(e)
        }
    }
}

/// Abandon the active scan
pub async fn cancel_command(client: &mut AgentClient) -> Result<()> {
    let before = client.status().await?;
    let after = client.cancel_scan().await?;
    if before.scan_active {
        print_success("Scan cancelled");
    } else {
        print_warning("No scan was active");
    }
    print_state(&after);
    Ok(())
}

/// Return the orchestrator to idle
pub async fn reset_command(client: &mut AgentClient) -> Result<()> {
    let status = client.reset_scan().await?;
    print_success("Scan state reset");
    print_state(&status);
    Ok(())
}

fn report_outcome(outcome: &StepOutcome) -> Result<()> {
    match outcome {
        StepOutcome::Completed { .. } => print_success("All checks passed"),
        StepOutcome::Blocked { .. } => print_warning("Scan blocked"),
    }
    print!("{}", format_outcome(outcome));
    Ok(())
}

fn print_state(status: &ScanStatus) {
    println!("Scan State: {}", status.state);
}

//! Status command implementation

use anyhow::Result;

use crate::ipc::AgentClient;
use crate::output::{format_status, print_error};

/// Execute the status command
pub async fn status_command(client: &mut AgentClient, json: bool) -> Result<()> {
    let status = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to get scan status: {}", e));
            print_error("Is the agent running? Try: vigild --foreground");
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", format_status(&status));
    }

    Ok(())
}

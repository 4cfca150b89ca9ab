//! Stream allow-listed events from the agent

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::ipc::AgentClient;
use crate::output::{format_event, print_info, print_warning};

/// Print events as they arrive until Ctrl+C or the agent goes away
pub async fn watch_command(client: &mut AgentClient, json: bool) -> Result<()> {
    client.connect().await?;
    print_info(&format!("Watching events from {} (Ctrl+C to stop)", client.address()));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = client.next_event() => event?,
        };

        match event {
            Some(event) if json => println!("{}", serde_json::to_string(&event)?),
            Some(event) => println!("{}", format_event(&event)),
            None => {
                print_warning("Agent closed the connection");
                break;
            }
        }
    }

    Ok(())
}

//! Client for the agent's command server

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use vg_core::config::DEFAULT_IPC_PORT;
use vg_protocol::{
    ClientMessage, CommandAction, CommandResult, EventMessage, JsonLineCodec, Parsed, ScanStatus,
    ServerMessage, StepOutcome,
};

/// Upper bound for one command round trip; a step runs up to two provider calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default command server address
pub fn default_ipc_address() -> String {
    format!("127.0.0.1:{}", DEFAULT_IPC_PORT)
}

struct Connection {
    lines: FramedRead<OwnedReadHalf, JsonLineCodec<ServerMessage>>,
    sink: FramedWrite<OwnedWriteHalf, JsonLineCodec<ServerMessage>>,
}

/// Client for communicating with the agent daemon
pub struct AgentClient {
    address: String,
    connection: Option<Connection>,
    /// Events that arrived while waiting for a reply
    pending_events: VecDeque<EventMessage>,
}

impl AgentClient {
    /// Create a new client with the default address
    pub fn new() -> Self {
        Self::with_address(default_ipc_address())
    }

    /// Create a new client for a localhost port
    pub fn with_port(port: u16) -> Self {
        Self::with_address(format!("127.0.0.1:{}", port))
    }

    /// Create a new client with a custom address
    pub fn with_address(address: String) -> Self {
        Self {
            address,
            connection: None,
            pending_events: VecDeque::new(),
        }
    }

    /// Get the address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect if not already connected
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to agent at {}", self.address);
        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!("Failed to connect to agent at {}. Is vigild running?", self.address)
        })?;

        let (reader, writer) = stream.into_split();
        self.connection = Some(Connection {
            lines: FramedRead::new(reader, JsonLineCodec::new()),
            sink: FramedWrite::new(writer, JsonLineCodec::new()),
        });
        Ok(())
    }

    /// Check whether the agent answers
    pub async fn ping(&mut self) -> Result<bool> {
        match self.request(ClientMessage::Ping).await? {
            ServerMessage::Pong => Ok(true),
            _ => Ok(false),
        }
    }

    /// Run a command and return the raw result
    pub async fn command(&mut self, action: CommandAction) -> Result<CommandResult> {
        match self.request(ClientMessage::command(action)).await? {
            ServerMessage::CommandResponse { result, .. } => Ok(result),
            ServerMessage::Error { message } => bail!("Agent rejected {}: {}", action, message),
            other => bail!("Unexpected response to {}: {:?}", action, other),
        }
    }

    /// Start a stepped scan
    pub async fn start_scan(&mut self) -> Result<StepOutcome> {
        let result = self.command(CommandAction::StartSteppedScan).await?;
        expect_outcome(result)
    }

    /// Retry a blocked step (1 or 2)
    pub async fn retry_step(&mut self, step: u8) -> Result<StepOutcome> {
        let action = match step {
            1 => CommandAction::RetryStep1,
            2 => CommandAction::RetryStep2,
            other => bail!("There is no step {}", other),
        };
        let result = self.command(action).await?;
        expect_outcome(result)
    }

    /// Current scan status
    pub async fn status(&mut self) -> Result<ScanStatus> {
        let result = self.command(CommandAction::GetScanStatus).await?;
        expect_status(result)
    }

    /// Cancel the active scan
    pub async fn cancel_scan(&mut self) -> Result<ScanStatus> {
        let result = self.command(CommandAction::CancelScan).await?;
        expect_status(result)
    }

    /// Return the orchestrator to idle
    pub async fn reset_scan(&mut self) -> Result<ScanStatus> {
        let result = self.command(CommandAction::ResetScan).await?;
        expect_status(result)
    }

    /// Wait for the next pushed event; `None` once the agent closes the connection
    pub async fn next_event(&mut self) -> Result<Option<EventMessage>> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(Some(event));
        }

        self.connect().await?;
        loop {
            match self.read().await? {
                Some(ServerMessage::Event(event)) => return Ok(Some(event)),
                Some(other) => tracing::debug!("Ignoring unsolicited message: {:?}", other),
                None => return Ok(None),
            }
        }
    }

    /// Send a message and wait for the first non-event reply
    async fn request(&mut self, message: ClientMessage) -> Result<ServerMessage> {
        self.connect().await?;

        let Some(connection) = self.connection.as_mut() else {
            bail!("Not connected");
        };
        connection
            .sink
            .send(message)
            .await
            .context("Failed to send request")?;

        let reply = match tokio::time::timeout(REQUEST_TIMEOUT, self.read_reply()).await {
            Ok(reply) => reply,
            Err(_) => Err(anyhow!("Timed out waiting for agent response")),
        };

        if reply.is_err() {
            // The stream is out of step after a failed or abandoned read
            self.connection = None;
        }
        reply
    }

    async fn read_reply(&mut self) -> Result<ServerMessage> {
        loop {
            match self.read().await? {
                Some(ServerMessage::Event(event)) => self.pending_events.push_back(event),
                Some(reply) => return Ok(reply),
                None => bail!("Agent closed the connection"),
            }
        }
    }

    async fn read(&mut self) -> Result<Option<ServerMessage>> {
        let Some(connection) = self.connection.as_mut() else {
            bail!("Not connected");
        };

        loop {
            match connection.lines.next().await {
                None => return Ok(None),
                Some(Ok(Parsed::Message(message))) => return Ok(Some(message)),
                Some(Ok(Parsed::Malformed(reason))) => {
                    tracing::warn!("Skipping malformed line from agent: {}", reason);
                }
                Some(Err(e)) => return Err(e).context("Failed to read from agent"),
            }
        }
    }
}

impl Default for AgentClient {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_outcome(result: CommandResult) -> Result<StepOutcome> {
    if !result.ok {
        bail!("{}", result.error.unwrap_or_else(|| "command failed".to_string()));
    }
    result.outcome.context("Response carried no step outcome")
}

fn expect_status(result: CommandResult) -> Result<ScanStatus> {
    if !result.ok {
        bail!("{}", result.error.unwrap_or_else(|| "command failed".to_string()));
    }
    result.status.context("Response carried no scan status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use vg_protocol::{names, EventKind, ScanState};

    fn idle_status() -> ScanStatus {
        ScanStatus {
            scan_active: false,
            scan_id: None,
            state: ScanState::Idle,
            current_step: None,
            detections: Default::default(),
            can_start_new_scan: true,
            is_blocked: false,
            is_completed: false,
        }
    }

    /// Accept one client and answer every line with the scripted replies
    async fn scripted_agent(replies: Vec<Vec<ServerMessage>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            for batch in replies {
                if lines.next_line().await.unwrap().is_none() {
                    return;
                }
                for message in batch {
                    let mut line = serde_json::to_string(&message).unwrap();
                    line.push('\n');
                    writer.write_all(line.as_bytes()).await.unwrap();
                }
            }
        });

        address
    }

    #[tokio::test]
    async fn test_events_before_reply_are_buffered() {
        let event = EventMessage::new(EventKind::Event, names::NO_ISSUES_DETECTED, None, 1);
        let address = scripted_agent(vec![vec![
            ServerMessage::Event(event.clone()),
            ServerMessage::CommandResponse {
                original_command: ClientMessage::command(CommandAction::GetScanStatus),
                result: CommandResult::status(idle_status()),
                timestamp: 2,
            },
        ]])
        .await;

        let mut client = AgentClient::with_address(address);
        let status = client.status().await.unwrap();
        assert_eq!(status.state, ScanState::Idle);

        let buffered = client.next_event().await.unwrap().unwrap();
        assert_eq!(buffered, event);
    }

    #[tokio::test]
    async fn test_failed_command_surfaces_error() {
        let address = scripted_agent(vec![vec![ServerMessage::CommandResponse {
            original_command: ClientMessage::command(CommandAction::RetryStep2),
            result: CommandResult::failure("Scan is not blocked at step 2"),
            timestamp: 1,
        }]])
        .await;

        let mut client = AgentClient::with_address(address);
        let err = client.retry_step(2).await.unwrap_err();
        assert!(err.to_string().contains("not blocked at step 2"));
    }

    #[tokio::test]
    async fn test_invalid_step_is_rejected_locally() {
        let mut client = AgentClient::with_address("127.0.0.1:1".to_string());
        assert!(client.retry_step(3).await.is_err());
        assert!(client.connection.is_none());
    }

    #[tokio::test]
    async fn test_closed_connection_ends_event_stream() {
        let address = scripted_agent(vec![]).await;
        let mut client = AgentClient::with_address(address);
        client.connect().await.unwrap();
        assert!(client.next_event().await.unwrap().is_none());
    }
}

//! Command and delivery messages
//!
//! # Message Flow
//!
//! 1. Client connects to the command server and receives
//!    `CLIENT_AND_APP_CONNECTED` as its first event
//! 2. Client sends `{"type":"command","action":...}` lines
//! 3. Server answers each with a `command_response` on the same connection
//! 4. Allow-listed events are pushed unsolicited as `{"type":"event",...}`
//!
//! The remote relay only ever sends `event` lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::event::{EventKind, EventMessage};
use crate::scan::{ScanStatus, StepOutcome};

/// Orchestrator operations reachable over the command server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    StartSteppedScan,
    #[serde(rename = "retry_step1")]
    RetryStep1,
    #[serde(rename = "retry_step2")]
    RetryStep2,
    GetScanStatus,
    CancelScan,
    ResetScan,
}

impl CommandAction {
    /// All recognized actions
    pub const ALL: [CommandAction; 6] = [
        CommandAction::StartSteppedScan,
        CommandAction::RetryStep1,
        CommandAction::RetryStep2,
        CommandAction::GetScanStatus,
        CommandAction::CancelScan,
        CommandAction::ResetScan,
    ];

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::StartSteppedScan => "start_stepped_scan",
            CommandAction::RetryStep1 => "retry_step1",
            CommandAction::RetryStep2 => "retry_step2",
            CommandAction::GetScanStatus => "get_scan_status",
            CommandAction::CancelScan => "cancel_scan",
            CommandAction::ResetScan => "reset_scan",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownAction(s.to_string()))
    }
}

/// Message from a client to the command server
///
/// The action is kept as a raw string so that unknown actions can be
/// answered with a structured error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Invoke an orchestrator operation
    Command { action: String },
    /// Keepalive
    Ping,
}

impl ClientMessage {
    /// Build a command message for a known action
    pub fn command(action: CommandAction) -> Self {
        ClientMessage::Command {
            action: action.as_str().to_string(),
        }
    }
}

/// Result body of a command response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
}

impl CommandResult {
    /// Successful step execution
    pub fn outcome(outcome: StepOutcome) -> Self {
        Self {
            ok: true,
            outcome: Some(outcome),
            ..Default::default()
        }
    }

    /// Successful status read or state change
    pub fn status(status: ScanStatus) -> Self {
        Self {
            ok: true,
            status: Some(status),
            ..Default::default()
        }
    }

    /// Failed command
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Message from the server (or relay) to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Answer to a `command` message
    CommandResponse {
        #[serde(rename = "originalCommand")]
        original_command: ClientMessage,
        result: CommandResult,
        timestamp: u64,
    },
    /// Unsolicited allow-listed event
    Event(EventMessage),
    /// Answer to `ping`
    Pong,
    /// The inbound line could not be understood
    Error { message: String },
}

/// Body of an externally submitted stage/event injection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectRequest {
    pub kind: EventKind,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::names;

    #[test]
    fn test_command_request_shape() {
        let msg = ClientMessage::command(CommandAction::RetryStep1);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"command","action":"retry_step1"}"#);
    }

    #[test]
    fn test_action_parsing() {
        for action in CommandAction::ALL {
            assert_eq!(action.as_str().parse::<CommandAction>().unwrap(), action);
            let via_serde: CommandAction =
                serde_json::from_str(&format!("\"{}\"", action.as_str())).unwrap();
            assert_eq!(via_serde, action);
        }

        let err = "format_disk".parse::<CommandAction>().unwrap_err();
        assert!(err.to_string().contains("format_disk"));
    }

    #[test]
    fn test_ping_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_command_response_shape() {
        let response = ServerMessage::CommandResponse {
            original_command: ClientMessage::command(CommandAction::CancelScan),
            result: CommandResult::failure("nope"),
            timestamp: 99,
        };
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["type"], "command_response");
        assert_eq!(value["originalCommand"]["action"], "cancel_scan");
        assert_eq!(value["result"]["ok"], false);
        assert_eq!(value["result"]["error"], "nope");
        assert!(value["result"].get("outcome").is_none());
        assert_eq!(value["timestamp"], 99);
    }

    #[test]
    fn test_event_delivery_shape() {
        let msg = ServerMessage::Event(EventMessage::new(
            EventKind::Event,
            names::NO_ISSUES_DETECTED,
            None,
            7,
        ));
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "event");
        assert_eq!(value["kind"], "event");
        assert_eq!(value["name"], "NO_ISSUES_DETECTED");
        assert_eq!(value["ts"], 7);

        let decoded: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_inject_request_defaults_payload() {
        let req: InjectRequest =
            serde_json::from_str(r#"{"kind":"event","name":"NO_ISSUES_DETECTED"}"#).unwrap();
        assert_eq!(req.kind, EventKind::Event);
        assert!(req.payload.is_null());
    }
}

//! vg-protocol: Wire types for the Vigil monitoring agent
//!
//! This crate defines the messages exchanged between the agent daemon,
//! its local clients and the remote observer, plus the scan data they
//! carry. Everything on the wire is newline-delimited JSON.

pub mod codec;
pub mod error;
pub mod event;
pub mod message;
pub mod scan;
pub mod session;

pub use codec::{JsonLineCodec, Parsed, MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use event::{is_allowlisted, names, EventKind, EventMessage, OUTBOUND_ALLOWLIST};
pub use message::{ClientMessage, CommandAction, CommandResult, InjectRequest, ServerMessage};
pub use scan::{
    Detection, DetectionBucket, ScanReport, ScanState, ScanStatus, ScanSummary, Severity,
    StepOutcome, SystemReport,
};
pub use session::{ScanId, ScanSession};

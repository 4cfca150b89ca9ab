//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or interpreting wire messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A line exceeded the codec's maximum length without a terminator
    #[error("Line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong { size: usize, max: usize },

    /// Command action not recognized by this agent
    #[error("Unknown command action: {0}")]
    UnknownAction(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

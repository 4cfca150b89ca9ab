//! Command server client
//!
//! Speaks line-delimited JSON over TCP on localhost. Events pushed by the
//! server while a command is in flight are buffered, not lost.

mod client;

pub use client::{default_ipc_address, AgentClient};

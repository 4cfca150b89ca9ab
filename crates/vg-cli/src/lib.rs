//! vigil: Operator CLI for the Vigil agent
//!
//! Drives the stepped scan over the command server, watches allow-listed
//! events and queries the daemon's HTTP surface.

pub mod commands;
pub mod ipc;
pub mod output;

//! Command server for local UI clients and the CLI
//!
//! Newline-delimited JSON over TCP on 127.0.0.1. Clients send commands and
//! pings; the server answers on the same connection and pushes allow-listed
//! events as they are published.

mod dispatch;
mod server;

pub use dispatch::dispatch;
pub use server::CommandServer;

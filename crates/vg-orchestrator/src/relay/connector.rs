//! Outbound connection to the remote observer

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpStream;

/// Open one TCP connection, bounded by `timeout`
pub async fn connect(address: &str, timeout: Duration) -> Result<TcpStream> {
    tracing::debug!("Connecting to relay endpoint {}", address);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| anyhow::anyhow!("Connection to {} timed out after {:?}", address, timeout))?
        .with_context(|| format!("Failed to connect to {}", address))?;

    stream.set_nodelay(true)?;
    Ok(stream)
}

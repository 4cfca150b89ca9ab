//! Remote relay
//!
//! Keeps one outbound connection to a remote observer and forwards the same
//! allow-listed events the command server pushes to local clients. Lost
//! connections are retried after a fixed delay until shutdown. Events
//! published while disconnected are dropped rather than queued.

mod backoff;
mod connector;

pub use backoff::Backoff;
pub use connector::connect;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use vg_core::config::RelayConfig;
use vg_protocol::{EventMessage, JsonLineCodec, ServerMessage};

use crate::bus::EventBus;

/// Events buffered between the bus and the socket
const RELAY_QUEUE: usize = 256;

/// Forwards allow-listed events to a remote observer
pub struct RemoteRelay {
    config: RelayConfig,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl RemoteRelay {
    pub fn new(config: RelayConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Whether the remote connection is currently up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect, forward and reconnect until shutdown
    pub async fn run(&self) -> Result<()> {
        let (queue_tx, mut queue_rx) = mpsc::channel::<EventMessage>(RELAY_QUEUE);
        let connected = Arc::clone(&self.connected);
        let _subscription = self.bus.subscribe(move |message| {
            if !message.is_outbound() || !connected.load(Ordering::SeqCst) {
                return Ok(());
            }
            queue_tx
                .try_send(message.clone())
                .map_err(|e| anyhow::anyhow!("relay queue rejected {}: {}", message.name, e))
        });

        let mut backoff = Backoff::fixed(self.config.retry_delay);

        loop {
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = connect(&self.config.address, self.config.connect_timeout) => attempt,
            };

            match attempt {
                Ok(stream) => {
                    tracing::info!("Relay connected to {}", self.config.address);
                    backoff.reset();
                    self.connected.store(true, Ordering::SeqCst);

                    let result = self.forward(stream, &mut queue_rx).await;

                    self.connected.store(false, Ordering::SeqCst);
                    // Anything queued for the dead connection is stale now
                    while queue_rx.try_recv().is_ok() {}

                    match result {
                        Ok(()) if self.shutdown.is_cancelled() => break,
                        Ok(()) => tracing::info!("Relay endpoint {} closed the connection", self.config.address),
                        Err(e) => tracing::warn!("Relay connection to {} lost: {:#}", self.config.address, e),
                    }
                }
                Err(e) => {
                    tracing::warn!("Relay connection failed: {:#}", e);
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!("Reconnecting relay in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Relay to {} stopped", self.config.address);
        Ok(())
    }

    /// Pump queued events to one connection until it fails or closes
    async fn forward(
        &self,
        stream: TcpStream,
        queue: &mut mpsc::Receiver<EventMessage>,
    ) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let mut sink = FramedWrite::new(writer, JsonLineCodec::<serde_json::Value>::new());
        // The observer does not talk back; reading only detects a closed peer
        let mut inbound = FramedRead::new(reader, JsonLineCodec::<serde_json::Value>::new());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),

                message = queue.recv() => match message {
                    Some(message) => {
                        tracing::debug!("Relaying {}", message.name);
                        sink.send(ServerMessage::Event(message)).await?;
                    }
                    None => return Ok(()),
                },

                frame = inbound.next() => match frame {
                    None => return Ok(()),
                    Some(Ok(_)) => tracing::trace!("Ignoring inbound relay line"),
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}

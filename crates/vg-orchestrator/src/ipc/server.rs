//! Command server implementation
//!
//! Listens on localhost TCP only. Every connection reads [`ClientMessage`]
//! lines and writes [`ServerMessage`] lines; allow-listed events from the bus
//! are fanned out to all connections through a broadcast channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vg_core::time::current_time_millis;
use vg_protocol::{
    names, ClientMessage, EventMessage, JsonLineCodec, Parsed, ProtocolError, ServerMessage,
};

use super::dispatch::dispatch;
use crate::bus::EventBus;
use crate::scan::ScanOrchestrator;

/// Outbound event buffer per connection
const EVENT_BUFFER: usize = 1024;

type LineReader = FramedRead<OwnedReadHalf, JsonLineCodec<ClientMessage>>;
type LineWriter = FramedWrite<OwnedWriteHalf, JsonLineCodec<ClientMessage>>;

/// Command server for UI and CLI clients
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct CommandServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    orchestrator: Arc<ScanOrchestrator>,
    bus: Arc<EventBus>,
    /// Allow-listed events for connected clients
    outbound: broadcast::Sender<EventMessage>,
    /// Live connections and their cancellation tokens
    connections: Arc<DashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
}

impl CommandServer {
    /// Create a new command server
    pub fn new(address: String, orchestrator: Arc<ScanOrchestrator>, bus: Arc<EventBus>) -> Self {
        let (outbound, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            address,
            orchestrator,
            bus,
            outbound,
            connections: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind command server to {}", self.address))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    ///
    /// On return the bus subscription is gone, every client connection has
    /// been closed and the listening socket is released.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Command server listening on {}", local_addr);

        let outbound = self.outbound.clone();
        let subscription = self.bus.subscribe(move |message| {
            if message.is_outbound() {
                // No connected clients is not an error
                let _ = outbound.send(message.clone());
            }
            Ok(())
        });

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        // Only accept connections from localhost
                        if !peer_addr.ip().is_loopback() {
                            tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                            continue;
                        }
                        self.spawn_connection(&mut tasks, stream, peer_addr);
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        tracing::info!("Command server on {} shutting down", local_addr);
        drop(subscription);
        for connection in self.connections.iter() {
            connection.value().cancel();
        }
        drop(listener);
        while tasks.join_next().await.is_some() {}
        self.connections.clear();

        Ok(())
    }

    fn spawn_connection(&self, tasks: &mut JoinSet<()>, stream: TcpStream, peer_addr: SocketAddr) {
        let id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        self.connections.insert(id, cancel.clone());

        let connection = Connection {
            id,
            peer_addr,
            orchestrator: Arc::clone(&self.orchestrator),
            bus: Arc::clone(&self.bus),
            events: self.outbound.subscribe(),
            cancel,
        };
        let connections = Arc::clone(&self.connections);

        tasks.spawn(async move {
            if let Err(e) = connection.run(stream).await {
                tracing::warn!("Client {} error: {:#}", peer_addr, e);
            }
            connections.remove(&id);
        });
    }
}

/// State for a single client connection
struct Connection {
    id: Uuid,
    peer_addr: SocketAddr,
    orchestrator: Arc<ScanOrchestrator>,
    bus: Arc<EventBus>,
    events: broadcast::Receiver<EventMessage>,
    cancel: CancellationToken,
}

impl Connection {
    async fn run(mut self, stream: TcpStream) -> Result<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = FramedRead::new(reader, JsonLineCodec::<ClientMessage>::new());
        let mut sink = FramedWrite::new(writer, JsonLineCodec::<ClientMessage>::new());

        tracing::debug!("Client {} connected ({})", self.peer_addr, self.id);
        self.bus.publish_event(
            names::CLIENT_AND_APP_CONNECTED,
            Some(json!({ "clientId": self.id, "peer": self.peer_addr.to_string() })),
        );

        let result = self.serve(&mut lines, &mut sink).await;

        tracing::debug!("Client {} disconnected ({})", self.peer_addr, self.id);
        self.bus.publish_event(
            names::CLIENT_AND_APP_DISCONNECTED,
            Some(json!({ "clientId": self.id, "peer": self.peer_addr.to_string() })),
        );
        result
    }

    async fn serve(&mut self, lines: &mut LineReader, sink: &mut LineWriter) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                frame = lines.next() => match frame {
                    None => break,
                    Some(Ok(Parsed::Message(message))) => {
                        let reply = self.handle(message).await;
                        sink.send(reply).await?;
                    }
                    Some(Ok(Parsed::Malformed(reason))) => {
                        sink.send(ServerMessage::Error {
                            message: format!("Invalid message: {}", reason),
                        })
                        .await?;
                    }
                    Some(Err(e @ ProtocolError::LineTooLong { .. })) => {
                        // The stream cannot be resynchronized after an oversized line
                        sink.send(ServerMessage::Error { message: e.to_string() }).await?;
                        break;
                    }
                    Some(Err(e)) => return Err(e.into()),
                },

                event = self.events.recv() => match event {
                    Ok(message) => sink.send(ServerMessage::Event(message)).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Client {} lagged by {} events", self.peer_addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        Ok(())
    }

    async fn handle(&self, message: ClientMessage) -> ServerMessage {
        match message {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::Command { ref action } => {
                let result = dispatch(&self.orchestrator, action).await;
                ServerMessage::CommandResponse {
                    original_command: message.clone(),
                    result,
                    timestamp: current_time_millis(),
                }
            }
        }
    }
}

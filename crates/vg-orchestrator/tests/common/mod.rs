//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};

use vg_core::traits::{NotificationAudit, NotificationProvider, SecurityProvider};
use vg_core::{ProviderError, SignatureSet, SignatureStore};
use vg_orchestrator::{EventBus, ScanOrchestrator};
use vg_protocol::{
    ClientMessage, Detection, JsonLineCodec, Parsed, ServerMessage, Severity, SystemReport,
};

/// How long a test waits for any single line
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification provider with a fixed, swappable audit
pub struct FixedNotifications {
    audit: Mutex<NotificationAudit>,
}

impl FixedNotifications {
    pub fn new(focus_active: bool) -> Arc<Self> {
        Arc::new(Self {
            audit: Mutex::new(NotificationAudit {
                focus_active,
                detections: vec![],
            }),
        })
    }

    pub fn set_focus(&self, focus_active: bool) {
        self.audit.lock().focus_active = focus_active;
    }
}

#[async_trait]
impl NotificationProvider for FixedNotifications {
    async fn audit(&self) -> Result<NotificationAudit, ProviderError> {
        Ok(self.audit.lock().clone())
    }
}

/// Security provider reporting a fixed list of threats
pub struct FixedSecurity {
    threats: Mutex<Vec<Detection>>,
}

impl FixedSecurity {
    pub fn new(threats: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            threats: Mutex::new(threats),
        })
    }
}

#[async_trait]
impl SecurityProvider for FixedSecurity {
    async fn system_snapshot(&self) -> Result<SystemReport, ProviderError> {
        Ok(SystemReport {
            hostname: "itest-host".to_string(),
            process_count: 7,
            ..Default::default()
        })
    }

    async fn scan_threats(&self, _: &SignatureSet) -> Result<Vec<Detection>, ProviderError> {
        Ok(self.threats.lock().clone())
    }
}

pub fn threat(name: &str) -> Detection {
    Detection::new("unwanted_app", Severity::High, format!("{} is running", name))
        .with_detail("process", name)
}

/// Bus plus orchestrator wired to the given providers
pub fn orchestrator(
    notifications: Arc<FixedNotifications>,
    security: Arc<FixedSecurity>,
) -> (Arc<EventBus>, Arc<ScanOrchestrator>) {
    let bus = Arc::new(EventBus::new());
    let orchestrator = Arc::new(ScanOrchestrator::new(
        notifications,
        security,
        Arc::new(SignatureStore::new(SignatureSet::default())),
        Arc::clone(&bus),
        Duration::from_secs(5),
    ));
    (bus, orchestrator)
}

/// Line-oriented client for the command server
pub struct TestClient {
    lines: FramedRead<OwnedReadHalf, JsonLineCodec<ServerMessage>>,
    sink: FramedWrite<OwnedWriteHalf, JsonLineCodec<ServerMessage>>,
}

impl TestClient {
    pub async fn connect(address: &str) -> Self {
        let stream = TcpStream::connect(address)
            .await
            .expect("Failed to connect to command server");
        let (reader, writer) = stream.into_split();
        Self {
            lines: FramedRead::new(reader, JsonLineCodec::new()),
            sink: FramedWrite::new(writer, JsonLineCodec::new()),
        }
    }

    pub async fn send(&mut self, message: ClientMessage) {
        self.sink.send(message).await.expect("Failed to send");
    }

    /// Write a raw line, bypassing serialization
    pub async fn send_raw(&mut self, line: &str) {
        use tokio::io::AsyncWriteExt;
        let writer = self.sink.get_mut();
        writer.write_all(line.as_bytes()).await.expect("Failed to write");
        writer.write_all(b"\n").await.expect("Failed to write");
    }

    /// Next server message, or `None` once the server closes the stream
    pub async fn next(&mut self) -> Option<ServerMessage> {
        let frame = timeout(READ_TIMEOUT, self.lines.next())
            .await
            .expect("Timed out waiting for server message")?;
        match frame.expect("Failed to read frame") {
            Parsed::Message(message) => Some(message),
            Parsed::Malformed(reason) => panic!("Server sent malformed line: {}", reason),
        }
    }

    /// Skip events until a non-event message arrives
    pub async fn reply(&mut self) -> ServerMessage {
        loop {
            match self.next().await {
                Some(ServerMessage::Event(_)) => continue,
                Some(message) => return message,
                None => panic!("Connection closed while waiting for a reply"),
            }
        }
    }

    /// Next event pushed by the server
    pub async fn event(&mut self) -> vg_protocol::EventMessage {
        match self.next().await {
            Some(ServerMessage::Event(event)) => event,
            other => panic!("Expected event, got {:?}", other),
        }
    }

    /// Assert nothing arrives within `window`
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(frame) = timeout(window, self.lines.next()).await {
            panic!("Expected no message, got {:?}", frame.map(|f| f.ok()));
        }
    }
}

//! Remote relay integration tests
//!
//! A local listener plays the remote observer.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use vg_core::config::RelayConfig;
use vg_orchestrator::relay::RemoteRelay;
use vg_orchestrator::EventBus;
use vg_protocol::{names, EventMessage, JsonLineCodec, Parsed, ServerMessage};

type ObserverStream = FramedRead<TcpStream, JsonLineCodec<ServerMessage>>;

fn relay_config(address: &str) -> RelayConfig {
    RelayConfig {
        enabled: true,
        address: address.to_string(),
        retry_delay: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(1),
    }
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

async fn accept(listener: &TcpListener) -> ObserverStream {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("Relay never connected")
        .unwrap();
    FramedRead::new(stream, JsonLineCodec::new())
}

async fn next_event(stream: &mut ObserverStream) -> EventMessage {
    let frame = timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("Timed out waiting for relayed event")
        .expect("Relay closed the connection")
        .unwrap();
    match frame {
        Parsed::Message(ServerMessage::Event(event)) => event,
        other => panic!("Expected relayed event, got {:?}", other),
    }
}

fn start_relay(
    address: &str,
    bus: &Arc<EventBus>,
) -> (Arc<RemoteRelay>, CancellationToken, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let shutdown = CancellationToken::new();
    let relay = Arc::new(
        RemoteRelay::new(relay_config(address), Arc::clone(bus)).with_shutdown_token(shutdown.clone()),
    );
    let running = Arc::clone(&relay);
    let handle = tokio::spawn(async move { running.run().await });
    (relay, shutdown, handle)
}

#[tokio::test]
async fn test_relays_only_allowlisted_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let bus = Arc::new(EventBus::new());
    let (relay, shutdown, handle) = start_relay(&address, &bus);

    let mut observer = accept(&listener).await;
    wait_until("relay connection", || relay.is_connected()).await;

    bus.publish_stage(names::SCAN_STEP1_BLOCKED, None);
    bus.publish_event("INTERNAL_DIAGNOSTIC", Some(json!({"secret": true})));
    bus.publish_event(names::DETECTED_UNWANTED_APPS, Some(json!({"apps": ["obs"]})));

    let event = next_event(&mut observer).await;
    assert_eq!(event.name, names::DETECTED_UNWANTED_APPS);
    assert_eq!(event.payload["apps"][0], "obs");

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert!(!relay.is_connected());

    // Shutdown closes the socket after the last relayed event
    let rest = timeout(Duration::from_secs(5), observer.next()).await.unwrap();
    assert!(rest.is_none());
}

#[tokio::test]
async fn test_reconnects_after_observer_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let bus = Arc::new(EventBus::new());
    let (relay, shutdown, handle) = start_relay(&address, &bus);

    let first = accept(&listener).await;
    wait_until("first connection", || relay.is_connected()).await;
    drop(first);
    wait_until("disconnect", || !relay.is_connected()).await;

    let mut second = accept(&listener).await;
    wait_until("second connection", || relay.is_connected()).await;

    bus.publish_event(names::NO_ISSUES_DETECTED, None);
    assert_eq!(next_event(&mut second).await.name, names::NO_ISSUES_DETECTED);

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_events_while_disconnected_are_dropped() {
    // Reserve a port, then free it so the first attempts are refused
    let address = {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().to_string()
    };
    let bus = Arc::new(EventBus::new());
    let (relay, shutdown, handle) = start_relay(&address, &bus);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!relay.is_connected());
    bus.publish_event(names::ACTIVE_NOTIFICATION_SERVICE, None);

    let listener = TcpListener::bind(&address).await.unwrap();
    let mut observer = accept(&listener).await;
    wait_until("late connection", || relay.is_connected()).await;

    bus.publish_event(names::CLIENT_AND_APP_CONNECTED, None);
    assert_eq!(
        next_event(&mut observer).await.name,
        names::CLIENT_AND_APP_CONNECTED
    );

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_wait() {
    let address = {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        probe.local_addr().unwrap().to_string()
    };
    let bus = Arc::new(EventBus::new());
    let shutdown = CancellationToken::new();
    let mut config = relay_config(&address);
    config.retry_delay = Duration::from_secs(3600);
    let relay = RemoteRelay::new(config, Arc::clone(&bus)).with_shutdown_token(shutdown.clone());

    let handle = tokio::spawn(async move { relay.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    timeout(Duration::from_secs(2), handle)
        .await
        .expect("Relay ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(bus.subscriber_count(), 0);
}

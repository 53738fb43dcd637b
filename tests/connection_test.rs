//! Tests for the connection manager state machine and wire handling,
//! exercised over the in-process memory hub.

use std::time::Duration;

use peersync::connection::memory::MemoryHub;
use peersync::connection::{ConnectionManager, ConnectionState};
use peersync::models::{GeoPosition, LocationSample, PeerId};
use peersync::SyncError;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn sample(peer: &str, lat: f64, lng: f64) -> LocationSample {
    LocationSample::now(PeerId::from(peer), GeoPosition::new(lat, lng))
}

#[tokio::test]
async fn test_connect_registers_and_disconnect_is_idempotent() {
    let hub = MemoryHub::new();
    let mut mgr = ConnectionManager::new(PeerId::from("a"), hub.client());

    assert_eq!(mgr.state(), ConnectionState::Disconnected);
    assert_eq!(mgr.connect().await.unwrap(), ConnectionState::Connected);
    assert_eq!(hub.registered_count(), 1);

    mgr.disconnect().await;
    assert_eq!(mgr.state(), ConnectionState::Disconnected);
    mgr.disconnect().await;
    assert_eq!(mgr.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_handshake_failure_then_manual_retry() {
    let hub = MemoryHub::new();
    let mut backbone = hub.client();
    backbone.fail_next_connect();
    let mut mgr = ConnectionManager::new(PeerId::from("a"), backbone);

    let err = mgr.connect().await.unwrap_err();
    assert!(matches!(err, SyncError::ConnectionFailure(_)));
    assert_eq!(mgr.state(), ConnectionState::Errored);
    assert_eq!(hub.registered_count(), 0);

    // Errored -> Connecting -> Connected on an explicit retry; nothing
    // retried automatically.
    assert_eq!(mgr.connect().await.unwrap(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_publish_while_disconnected_is_dropped() {
    let hub = MemoryHub::new();
    let mut mgr = ConnectionManager::new(PeerId::from("a"), hub.client());

    let err = mgr.publish_sample(&sample("a", 1.0, 2.0)).await.unwrap_err();
    assert!(matches!(err, SyncError::NotConnected));

    // A connected observer sees nothing from the dropped publish.
    let mut observer = ConnectionManager::new(PeerId::from("obs"), hub.client());
    observer.connect().await.unwrap();
    let got = timeout(Duration::from_millis(200), observer.recv()).await;
    assert!(got.is_err(), "nothing should have reached the topic");
}

#[tokio::test]
async fn test_publish_roundtrip() {
    let hub = MemoryHub::new();
    let mut a = ConnectionManager::new(PeerId::from("a"), hub.client());
    let mut b = ConnectionManager::new(PeerId::from("b"), hub.client());
    a.connect().await.unwrap();
    b.connect().await.unwrap();

    a.publish_sample(&sample("a", 40.0, -77.0)).await.unwrap();

    let received = timeout(RECV_TIMEOUT, b.recv())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("decode failed");
    assert_eq!(received.peer, PeerId::from("a"));
    assert_eq!(received.position, GeoPosition::new(40.0, -77.0));

    // The topic echoes to every subscriber, the sender included.
    let echoed = timeout(RECV_TIMEOUT, a.recv())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("decode failed");
    assert_eq!(echoed.peer, PeerId::from("a"));
}

#[tokio::test]
async fn test_malformed_message_keeps_channel_alive() {
    let hub = MemoryHub::new();
    let mut b = ConnectionManager::new(PeerId::from("b"), hub.client());
    b.connect().await.unwrap();

    hub.inject(b"{definitely not json".to_vec());
    let err = timeout(RECV_TIMEOUT, b.recv())
        .await
        .expect("timed out")
        .expect("stream ended")
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedMessage(_)));
    assert_eq!(b.state(), ConnectionState::Connected);

    // A later valid message still comes through.
    hub.inject(br#"{"clientId":"c","latitude":"1.5","longitude":"2.5"}"#.to_vec());
    let received = timeout(RECV_TIMEOUT, b.recv())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("decode failed");
    assert_eq!(received.peer, PeerId::from("c"));
    assert_eq!(received.position, GeoPosition::new(1.5, 2.5));
}

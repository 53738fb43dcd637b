//! Connection Manager
//!
//! Owns the lifecycle of one logical connection to the broadcast backbone:
//! connect, subscribe, publish, disconnect, drop detection. The manager is
//! the sole owner and mutator of `ConnectionState`. Transport framing lives
//! behind the `Backbone` trait; the backbone is assumed to deliver messages
//! reliably and in order per topic.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::models::{GeoPosition, LocationSample, PeerId};

/// Shared topic every client subscribes to for peer location updates.
pub const LOCATION_TOPIC: &str = "/topic/locations";
/// Destination for publishing the local client's location.
pub const SYNC_DESTINATION: &str = "/app/syncLocations";
/// Destination for the one-shot registration announcement after connect.
pub const REGISTER_DESTINATION: &str = "/app/registerClient";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Errored => write!(f, "errored"),
        }
    }
}

/// A reliable, ordered-per-topic pub/sub session.
#[async_trait]
pub trait Backbone: Send {
    /// Establish the transport and messaging session, including the
    /// subscription to the shared location topic.
    async fn connect(&mut self) -> Result<(), SyncError>;

    /// Send a payload to a destination.
    async fn publish(&mut self, destination: &str, payload: Vec<u8>) -> Result<(), SyncError>;

    /// Next payload delivered on the location topic. `None` means the
    /// transport dropped or closed.
    async fn next_message(&mut self) -> Option<Vec<u8>>;

    /// Tear down the session. Idempotent.
    async fn disconnect(&mut self);
}

/// Outbound location update, as published to the backbone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub client_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Inbound coordinates may arrive as JSON numbers or numeric strings; both
/// are coerced. Anything else is malformed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn coerce(self, field: &str) -> Result<f64, SyncError> {
        match self {
            Coordinate::Number(v) => Ok(v),
            Coordinate::Text(s) => s
                .parse::<f64>()
                .map_err(|_| SyncError::MalformedMessage(format!("unparsable {field}: {s:?}"))),
        }
    }
}

// Unknown extra fields (server-assigned ids, timestamps) are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocationUpdate {
    client_id: String,
    latitude: Coordinate,
    longitude: Coordinate,
}

impl LocationUpdate {
    pub fn from_sample(sample: &LocationSample) -> Self {
        LocationUpdate {
            client_id: sample.peer.to_string(),
            latitude: sample.position.latitude,
            longitude: sample.position.longitude,
        }
    }

    /// Decode and validate an inbound payload.
    pub fn decode(payload: &[u8]) -> Result<Self, SyncError> {
        let raw: RawLocationUpdate = serde_json::from_slice(payload)
            .map_err(|e| SyncError::MalformedMessage(e.to_string()))?;
        let update = LocationUpdate {
            client_id: raw.client_id,
            latitude: raw.latitude.coerce("latitude")?,
            longitude: raw.longitude.coerce("longitude")?,
        };
        let pos = GeoPosition::new(update.latitude, update.longitude);
        if !pos.is_valid() {
            return Err(SyncError::MalformedMessage(format!(
                "coordinates out of range: {pos}"
            )));
        }
        Ok(update)
    }

    /// Turn the wire message into a sample observed at the receive instant.
    /// The wire format carries no trustworthy client clock.
    pub fn into_sample(self) -> LocationSample {
        LocationSample::new(
            PeerId::from(self.client_id),
            GeoPosition::new(self.latitude, self.longitude),
            Utc::now(),
        )
    }
}

pub struct ConnectionManager<B: Backbone> {
    backbone: B,
    state: ConnectionState,
    local_peer: PeerId,
}

impl<B: Backbone> ConnectionManager<B> {
    pub fn new(local_peer: PeerId, backbone: B) -> Self {
        ConnectionManager {
            backbone,
            state: ConnectionState::Disconnected,
            local_peer,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    /// Establish the session. On success the location topic is subscribed
    /// and the registration announcement has been sent. On failure the state
    /// is `Errored` and the failure is surfaced; retrying is the caller's
    /// decision.
    pub async fn connect(&mut self) -> Result<ConnectionState, SyncError> {
        if self.state == ConnectionState::Connected {
            return Ok(self.state);
        }
        self.state = ConnectionState::Connecting;
        if let Err(e) = self.backbone.connect().await {
            self.state = ConnectionState::Errored;
            return Err(e);
        }
        // Announce this peer to the backbone. A failure here means the
        // session is not usable after all.
        if let Err(e) = self
            .backbone
            .publish(REGISTER_DESTINATION, Vec::new())
            .await
        {
            self.state = ConnectionState::Errored;
            return Err(SyncError::ConnectionFailure(format!(
                "registration failed: {e}"
            )));
        }
        self.state = ConnectionState::Connected;
        info!("connected to backbone as peer {}", self.local_peer);
        Ok(self.state)
    }

    /// Publish one location sample. Never queues: when not connected the
    /// sample is dropped and `NotConnected` is returned.
    pub async fn publish_sample(&mut self, sample: &LocationSample) -> Result<(), SyncError> {
        if self.state != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        let update = LocationUpdate::from_sample(sample);
        let payload = serde_json::to_vec(&update)
            .map_err(|e| SyncError::MalformedMessage(format!("encode failed: {e}")))?;
        if let Err(e) = self.backbone.publish(SYNC_DESTINATION, payload).await {
            warn!("publish failed, marking connection errored: {}", e);
            self.state = ConnectionState::Errored;
            return Err(e);
        }
        debug!("published location for {}", sample.peer);
        Ok(())
    }

    /// Next inbound sample from the location topic.
    ///
    /// Malformed payloads surface as `Err(MalformedMessage)` and never kill
    /// the channel. `None` means the transport dropped; the state becomes
    /// `Errored` if it was `Connected`.
    pub async fn recv(&mut self) -> Option<Result<LocationSample, SyncError>> {
        match self.backbone.next_message().await {
            Some(payload) => Some(LocationUpdate::decode(&payload).map(|u| u.into_sample())),
            None => {
                if self.state == ConnectionState::Connected {
                    warn!("backbone transport dropped");
                    self.state = ConnectionState::Errored;
                }
                None
            }
        }
    }

    /// Graceful teardown; idempotent; always ends `Disconnected`.
    pub async fn disconnect(&mut self) {
        self.backbone.disconnect().await;
        if self.state != ConnectionState::Disconnected {
            info!("disconnected from backbone");
        }
        self.state = ConnectionState::Disconnected;
    }
}

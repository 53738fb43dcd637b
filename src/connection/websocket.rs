//! WebSocket backbone
//!
//! Thin `Backbone` over a `tokio-tungstenite` client. Frames are JSON text
//! envelopes `{"destination": "...", "body": "..."}`; the server relays
//! publishes to the sync destination back out on the location topic to every
//! subscriber. Frames without an envelope are treated as bare location-topic
//! payloads so the codec upstream decides whether they parse.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Backbone, LOCATION_TOPIC};
use crate::error::SyncError;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    destination: String,
    body: String,
}

pub struct WebSocketBackbone {
    url: String,
    ws: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketBackbone {
    pub fn new(url: impl Into<String>) -> Self {
        WebSocketBackbone {
            url: url.into(),
            ws: None,
        }
    }
}

#[async_trait]
impl Backbone for WebSocketBackbone {
    async fn connect(&mut self) -> Result<(), SyncError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::ConnectionFailure(e.to_string()))?;
        debug!("websocket handshake complete: {}", self.url);
        self.ws = Some(ws);
        Ok(())
    }

    async fn publish(&mut self, destination: &str, payload: Vec<u8>) -> Result<(), SyncError> {
        let ws = self.ws.as_mut().ok_or(SyncError::NotConnected)?;
        let envelope = Envelope {
            destination: destination.to_string(),
            body: String::from_utf8(payload)
                .map_err(|e| SyncError::MalformedMessage(format!("non-utf8 payload: {e}")))?,
        };
        let text = serde_json::to_string(&envelope)
            .map_err(|e| SyncError::MalformedMessage(format!("encode failed: {e}")))?;
        if let Err(e) = ws.send(Message::Text(text)).await {
            self.ws = None;
            return Err(SyncError::ConnectionFailure(e.to_string()));
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Vec<u8>> {
        let ws = self.ws.as_mut()?;
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(env) if env.destination == LOCATION_TOPIC => {
                        return Some(env.body.into_bytes())
                    }
                    Ok(env) => {
                        debug!("ignoring frame for destination {}", env.destination);
                    }
                    // Not an envelope: hand the raw text up and let the
                    // message codec accept or reject it.
                    Err(_) => return Some(text.into_bytes()),
                },
                Some(Ok(Message::Binary(data))) => return Some(data),
                Some(Ok(Message::Close(_))) | None => {
                    self.ws = None;
                    return None;
                }
                Some(Ok(_)) => {
                    // Ping/pong and other control frames.
                }
                Some(Err(e)) => {
                    warn!("websocket read error: {}", e);
                    self.ws = None;
                    return None;
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
    }
}

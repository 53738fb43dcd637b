//! In-process backbone
//!
//! `MemoryHub` plays the server role: it relays every publish to the sync
//! destination back out on the location topic to all attached clients (the
//! sender included, as a real broadcast topic would), and counts
//! registration announcements. Used by integration tests and local demos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Backbone, LOCATION_TOPIC, REGISTER_DESTINATION, SYNC_DESTINATION};
use crate::error::SyncError;

const HUB_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<(String, Vec<u8>)>,
    registrations: Arc<AtomicUsize>,
}

impl MemoryHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        MemoryHub {
            tx,
            registrations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A new client endpoint attached to this hub.
    pub fn client(&self) -> MemoryBackbone {
        MemoryBackbone {
            tx: self.tx.clone(),
            rx: None,
            registrations: self.registrations.clone(),
            fail_next_connect: false,
        }
    }

    /// How many registration announcements the hub has seen.
    pub fn registered_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Push a raw frame onto the location topic, as a server-side source
    /// would. Lets tests inject arbitrary (including malformed) payloads.
    pub fn inject(&self, payload: Vec<u8>) {
        let _ = self.tx.send((LOCATION_TOPIC.to_string(), payload));
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        MemoryHub::new()
    }
}

pub struct MemoryBackbone {
    tx: broadcast::Sender<(String, Vec<u8>)>,
    rx: Option<broadcast::Receiver<(String, Vec<u8>)>>,
    registrations: Arc<AtomicUsize>,
    fail_next_connect: bool,
}

impl MemoryBackbone {
    /// Make the next `connect` fail, to exercise handshake-failure paths.
    pub fn fail_next_connect(&mut self) {
        self.fail_next_connect = true;
    }
}

#[async_trait]
impl Backbone for MemoryBackbone {
    async fn connect(&mut self) -> Result<(), SyncError> {
        if self.fail_next_connect {
            self.fail_next_connect = false;
            return Err(SyncError::ConnectionFailure(
                "memory hub refused the handshake".to_string(),
            ));
        }
        self.rx = Some(self.tx.subscribe());
        Ok(())
    }

    async fn publish(&mut self, destination: &str, payload: Vec<u8>) -> Result<(), SyncError> {
        if self.rx.is_none() {
            return Err(SyncError::NotConnected);
        }
        match destination {
            // The hub is the server: sync publishes come back out on the
            // location topic for every subscriber.
            SYNC_DESTINATION => {
                let _ = self.tx.send((LOCATION_TOPIC.to_string(), payload));
            }
            REGISTER_DESTINATION => {
                self.registrations.fetch_add(1, Ordering::SeqCst);
            }
            other => {
                debug!("memory hub dropping publish to unknown destination {other}");
            }
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Vec<u8>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok((topic, payload)) if topic == LOCATION_TOPIC => return Some(payload),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("memory backbone lagged, skipped {skipped} frames");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        self.rx = None;
    }
}

//! Engine event loop
//!
//! Wires the connection manager, broadcast scheduler, peer location store
//! and marker reconciler into one `tokio::select!` loop. Everything runs as
//! discrete tasks on this single loop, so the store and the rendered marker
//! set are plain owned data with no locks. External control arrives over a
//! command channel via `EngineHandle`.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::{Backbone, ConnectionManager, ConnectionState};
use crate::error::SyncError;
use crate::models::{GeoPosition, LocationSample, PeerId};
use crate::render::{MapRenderer, MarkerReconciler, ViewportPolicy};
use crate::scheduler::{BroadcastScheduler, PositionSource};
use crate::store::{PeerLocationStore, StoreEvent};

const COMMAND_CAPACITY: usize = 16;

#[derive(Debug)]
pub enum EngineCommand {
    /// Sample and publish immediately, restarting the periodic grid timer.
    SyncNow,
    /// Gate the periodic timer.
    SetSyncEnabled(bool),
    /// Point-in-time view of the peer store.
    Snapshot(oneshot::Sender<Vec<(PeerId, LocationSample)>>),
    Shutdown,
}

/// Control handle for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Trigger an immediate sample + publish outside the grid.
    pub async fn sync_now(&self) {
        let _ = self.tx.send(EngineCommand::SyncNow).await;
    }

    pub async fn set_sync_enabled(&self, enabled: bool) {
        let _ = self.tx.send(EngineCommand::SetSyncEnabled(enabled)).await;
    }

    /// Current peers and their latest positions.
    pub async fn snapshot(&self) -> Vec<(PeerId, LocationSample)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(EngineCommand::Snapshot(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown).await;
    }
}

pub struct SyncEngine<B: Backbone, S: PositionSource, R: MapRenderer> {
    connection: ConnectionManager<B>,
    scheduler: BroadcastScheduler,
    source: S,
    renderer: R,
    store: PeerLocationStore,
    reconciler: MarkerReconciler,
    peer_ttl: Duration,
    commands: mpsc::Receiver<EngineCommand>,
    local_peer: PeerId,
}

impl<B: Backbone, S: PositionSource, R: MapRenderer> SyncEngine<B, S, R> {
    pub fn new(
        local_peer: PeerId,
        config: &Config,
        backbone: B,
        source: S,
        renderer: R,
    ) -> (Self, EngineHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let policy = ViewportPolicy {
            max_auto_zoom: config.max_auto_zoom,
            default_center: GeoPosition::new(config.default_latitude, config.default_longitude),
            default_zoom: config.default_zoom,
        };
        let engine = SyncEngine {
            connection: ConnectionManager::new(local_peer.clone(), backbone),
            scheduler: BroadcastScheduler::new(Duration::from_millis(config.sync_period_ms)),
            source,
            renderer,
            store: PeerLocationStore::new(),
            reconciler: MarkerReconciler::new(local_peer.clone(), policy),
            peer_ttl: Duration::from_millis(config.effective_peer_ttl_ms()),
            commands,
            local_peer,
        };
        (engine, EngineHandle { tx })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connect and run until shutdown or transport loss.
    ///
    /// A failed handshake or a mid-session transport drop surfaces here
    /// without any automatic retry; the caller owns the retry policy. A
    /// commanded shutdown returns `Ok`.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        self.connection.connect().await?;
        self.scheduler.align_to_grid_now();

        let mut prune = tokio::time::interval(self.peer_ttl);
        prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        prune.tick().await; // first tick resolves immediately

        info!(
            "sync engine running: peer={} period={:?} ttl={:?}",
            self.local_peer,
            self.scheduler.period(),
            self.peer_ttl
        );

        let mut transport_dropped = false;
        loop {
            tokio::select! {
                inbound = self.connection.recv() => match inbound {
                    Some(Ok(sample)) => {
                        self.store.upsert(sample);
                        self.refresh_markers();
                    }
                    Some(Err(e)) => {
                        // Malformed payloads never kill the channel.
                        warn!("inbound message dropped: {}", e);
                    }
                    None => {
                        warn!("backbone stream ended, stopping engine");
                        transport_dropped = true;
                        break;
                    }
                },
                _ = self.scheduler.tick() => {
                    self.sample_and_publish().await;
                },
                _ = prune.tick() => {
                    let cutoff = Utc::now()
                        - ChronoDuration::milliseconds(self.peer_ttl.as_millis() as i64);
                    let lost = self.store.prune_older_than(cutoff);
                    if !lost.is_empty() {
                        info!("pruned {} quiet peers", lost.len());
                    }
                    self.refresh_markers();
                },
                cmd = self.commands.recv() => match cmd {
                    Some(EngineCommand::SyncNow) => {
                        self.sample_and_publish().await;
                        // An on-demand emission lifts any suspension, and the
                        // just-emitted sample makes the next grid tick
                        // redundant; restart the period from now.
                        self.scheduler.set_enabled(true);
                        self.scheduler.restart_from_now();
                    }
                    Some(EngineCommand::SetSyncEnabled(enabled)) => {
                        self.scheduler.set_enabled(enabled);
                        if enabled {
                            self.scheduler.align_to_grid_now();
                        }
                    }
                    Some(EngineCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.store.snapshot());
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
            }
        }

        self.connection.disconnect().await;
        if transport_dropped {
            return Err(SyncError::ConnectionFailure(
                "backbone transport dropped".to_string(),
            ));
        }
        Ok(())
    }

    /// One sampling tick: read the position source, publish, mirror the
    /// sample locally. Source failures skip this tick only.
    async fn sample_and_publish(&mut self) {
        let position = match self.source.current_position().await {
            Ok(pos) if pos.is_valid() => pos,
            Ok(pos) => {
                warn!("position source returned out-of-range position {pos}, tick skipped");
                return;
            }
            Err(e) => {
                warn!("sampling tick skipped: {}", e);
                return;
            }
        };
        let sample = LocationSample::now(self.local_peer.clone(), position);
        match self.connection.publish_sample(&sample).await {
            Ok(()) => {
                self.store.upsert(sample);
                self.refresh_markers();
            }
            Err(e) => warn!("publish dropped: {}", e),
        }
    }

    /// Drain the store's event log and reconcile if anything actually
    /// changed. Stale drops alone do not warrant a render pass.
    fn refresh_markers(&mut self) {
        let events = self.store.take_events();
        let changed = events
            .iter()
            .any(|e| !matches!(e, StoreEvent::StaleDropped(_)));
        if changed {
            let snapshot = self.store.snapshot();
            self.reconciler.reconcile(&snapshot, &mut self.renderer);
        }
    }
}

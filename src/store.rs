//! Peer Location Store
//!
//! Latest known position per peer, last-write-wins by `observed_at` within a
//! single peer's samples. Mutated only from the inbound-message path (and the
//! local publish path for the session's own samples); consumers get
//! point-in-time snapshots. Effects are recorded as an append-only event log
//! instead of ad-hoc log lines so rendering can be diff-driven.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{LocationSample, PeerId};

/// One observable mutation of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// First sample ever seen for this peer.
    PeerAppeared(PeerId),
    /// A known peer's sample was replaced by a not-older one.
    PeerMoved(PeerId),
    /// An inbound sample was older than the stored one and was dropped.
    StaleDropped(PeerId),
    /// A peer was removed because it went quiet past the TTL.
    PeerPruned(PeerId),
}

#[derive(Debug, Default)]
pub struct PeerLocationStore {
    entries: HashMap<PeerId, LocationSample>,
    log: Vec<StoreEvent>,
}

impl PeerLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the sample for `sample.peer`.
    ///
    /// Returns whether the store changed. A sample with `observed_at` older
    /// than the stored one is rejected; equal timestamps replace, so
    /// re-delivery of the latest sample is harmless.
    pub fn upsert(&mut self, sample: LocationSample) -> bool {
        let peer = sample.peer.clone();
        match self.entries.get(&peer) {
            None => {
                debug!("store: peer appeared peer={} pos={}", peer, sample.position);
                self.entries.insert(peer.clone(), sample);
                self.log.push(StoreEvent::PeerAppeared(peer));
                true
            }
            Some(prev) if sample.observed_at >= prev.observed_at => {
                let changed = prev != &sample;
                self.entries.insert(peer.clone(), sample);
                // An identical re-delivery replaces silently; only a real
                // change is worth a render pass.
                if changed {
                    self.log.push(StoreEvent::PeerMoved(peer));
                }
                changed
            }
            Some(prev) => {
                debug!(
                    "store: stale sample dropped peer={} offered={} stored={}",
                    peer, sample.observed_at, prev.observed_at
                );
                self.log.push(StoreEvent::StaleDropped(peer));
                false
            }
        }
    }

    /// Consistent point-in-time view. Iteration order is stable within one
    /// call but carries no meaning across calls.
    pub fn snapshot(&self) -> Vec<(PeerId, LocationSample)> {
        self.entries
            .iter()
            .map(|(id, sample)| (id.clone(), sample.clone()))
            .collect()
    }

    pub fn get(&self, peer: &PeerId) -> Option<&LocationSample> {
        self.entries.get(peer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove peers whose latest sample is older than `cutoff`.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<PeerId> {
        let lost: Vec<PeerId> = self
            .entries
            .iter()
            .filter(|(_, sample)| sample.observed_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for peer in &lost {
            self.entries.remove(peer);
            self.log.push(StoreEvent::PeerPruned(peer.clone()));
            debug!("store: peer pruned peer={} remaining={}", peer, self.entries.len());
        }
        lost
    }

    /// Drain the accumulated event log.
    pub fn take_events(&mut self) -> Vec<StoreEvent> {
        std::mem::take(&mut self.log)
    }

    pub fn events(&self) -> &[StoreEvent] {
        &self.log
    }
}

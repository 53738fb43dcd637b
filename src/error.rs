//! Error types for the sync engine
//!
//! Every variant here is local and non-fatal: nothing in this crate is
//! allowed to terminate the session. Stale inbound samples are not errors at
//! all; the store rejects them silently (see `store::PeerLocationStore`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Handshake or transport could not be established. Surfaced to the
    /// caller; retrying is the caller's policy, never automatic.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Publish attempted while not connected. The sample is dropped rather
    /// than queued: a stale position is worse than a missing one.
    #[error("not connected to the broadcast backbone")]
    NotConnected,

    /// Inbound payload failed parsing or validation. The message is dropped
    /// and the channel stays alive.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The position source failed for one sampling tick. The tick is
    /// skipped; future ticks are unaffected.
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
}

//! PeerSync Library
//!
//! Real-time peer-location synchronization: a reconnecting pub/sub channel to
//! a broadcast backbone, a grid-aligned broadcast scheduler, an authoritative
//! latest-position-per-peer store, and a marker reconciliation engine that
//! turns store snapshots into minimal create/move/destroy rendering intents.

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod models;
pub mod render;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use engine::{EngineHandle, SyncEngine};
pub use error::SyncError;
pub use models::{GeoPosition, LocationSample, PeerId};

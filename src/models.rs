//! Core domain types: peer identity, positions, location samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique identifier for one client session.
///
/// Generated once at session start and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh session identity.
    pub fn generate() -> Self {
        PeerId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPosition {
            latitude,
            longitude,
        }
    }

    /// Whether the coordinates are inside the valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// The most recent known position of one peer. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub peer: PeerId,
    pub position: GeoPosition,
    pub observed_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(peer: PeerId, position: GeoPosition, observed_at: DateTime<Utc>) -> Self {
        LocationSample {
            peer,
            position,
            observed_at,
        }
    }

    /// A sample observed right now.
    pub fn now(peer: PeerId, position: GeoPosition) -> Self {
        LocationSample::new(peer, position, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_unique() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }

    #[test]
    fn test_position_validity() {
        assert!(GeoPosition::new(40.2027, -77.2008).is_valid());
        assert!(GeoPosition::new(-90.0, 180.0).is_valid());
        assert!(!GeoPosition::new(90.5, 0.0).is_valid());
        assert!(!GeoPosition::new(0.0, -180.1).is_valid());
        assert!(!GeoPosition::new(f64::NAN, 0.0).is_valid());
    }
}

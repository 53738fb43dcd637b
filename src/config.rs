use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Broadcast backbone endpoint.
    #[serde(default = "default_backbone_url")]
    pub backbone_url: String,

    /// Sampling period P in milliseconds; all clients emit on multiples of
    /// this period.
    #[serde(default = "default_sync_period_ms")]
    pub sync_period_ms: u64,

    /// Peers not heard from within this window are pruned. 0 means
    /// 3 x sync_period_ms.
    #[serde(default)]
    pub peer_ttl_ms: u64,

    /// Zoom clamp applied when fitting the viewport to the rendered markers.
    #[serde(default = "default_max_auto_zoom")]
    pub max_auto_zoom: u8,

    #[serde(default = "default_latitude")]
    pub default_latitude: f64,

    #[serde(default = "default_longitude")]
    pub default_longitude: f64,

    #[serde(default = "default_zoom")]
    pub default_zoom: u8,
}

fn default_backbone_url() -> String {
    "ws://localhost:8080/ws/locations".to_string()
}

fn default_sync_period_ms() -> u64 {
    10_000
}

fn default_max_auto_zoom() -> u8 {
    16
}

fn default_latitude() -> f64 {
    40.2027
}

fn default_longitude() -> f64 {
    -77.2008
}

fn default_zoom() -> u8 {
    12
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let settings: Config = config
            .try_deserialize()
            .unwrap_or_else(|_| Config::default());

        Ok(settings)
    }

    /// Effective peer TTL, resolving the 0 = "3 periods" default.
    pub fn effective_peer_ttl_ms(&self) -> u64 {
        if self.peer_ttl_ms == 0 {
            self.sync_period_ms.saturating_mul(3)
        } else {
            self.peer_ttl_ms
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backbone_url: default_backbone_url(),
            sync_period_ms: default_sync_period_ms(),
            peer_ttl_ms: 0,
            max_auto_zoom: default_max_auto_zoom(),
            default_latitude: default_latitude(),
            default_longitude: default_longitude(),
            default_zoom: default_zoom(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync_period_ms, 10_000);
        assert_eq!(config.max_auto_zoom, 16);
        assert_eq!(config.default_zoom, 12);
        assert_eq!(config.effective_peer_ttl_ms(), 30_000);
    }

    #[test]
    fn test_explicit_ttl_wins() {
        let config = Config {
            peer_ttl_ms: 45_000,
            ..Config::default()
        };
        assert_eq!(config.effective_peer_ttl_ms(), 45_000);
    }
}

use anyhow::Result;
use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peersync::connection::websocket::WebSocketBackbone;
use peersync::render::{BoundingBox, MapRenderer, MarkerHandle};
use peersync::scheduler::PositionSource;
use peersync::{Config, GeoPosition, PeerId, SyncEngine, SyncError};

/// Deterministic simulated position source: starts at the configured center
/// and drifts a little northeast on every sample.
struct DriftingPositionSource {
    position: GeoPosition,
}

#[async_trait]
impl PositionSource for DriftingPositionSource {
    async fn current_position(&mut self) -> Result<GeoPosition, SyncError> {
        self.position.latitude += 0.0005;
        self.position.longitude += 0.0005;
        Ok(self.position)
    }
}

/// Renderer that logs intents instead of drawing; stands in for a map
/// widget.
#[derive(Default)]
struct TraceRenderer {
    next_handle: u64,
}

impl MapRenderer for TraceRenderer {
    fn create_marker(&mut self, peer: &PeerId, position: GeoPosition, is_self: bool) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        tracing::info!("render: create marker peer={} pos={} self={}", peer, position, is_self);
        handle
    }

    fn move_marker(&mut self, handle: MarkerHandle, position: GeoPosition) {
        tracing::info!("render: move marker {:?} to {}", handle, position);
    }

    fn destroy_marker(&mut self, handle: MarkerHandle) {
        tracing::info!("render: destroy marker {:?}", handle);
    }

    fn fit_viewport(&mut self, bounds: BoundingBox, max_zoom: u8) {
        tracing::info!(
            "render: fit viewport to [{:.4},{:.4}]..[{:.4},{:.4}] (max zoom {})",
            bounds.south, bounds.west, bounds.north, bounds.east, max_zoom
        );
    }

    fn set_default_viewport(&mut self, center: GeoPosition, zoom: u8) {
        tracing::info!("render: default viewport center={} zoom={}", center, zoom);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PeerSync");

    let config = Config::load()?;
    tracing::info!("Configuration loaded, backbone: {}", config.backbone_url);

    let peer_id = PeerId::generate();
    tracing::info!("Session peer id: {}", peer_id);

    let backbone = WebSocketBackbone::new(&config.backbone_url);
    let source = DriftingPositionSource {
        position: GeoPosition::new(config.default_latitude, config.default_longitude),
    };
    let (mut engine, handle) =
        SyncEngine::new(peer_id, &config, backbone, source, TraceRenderer::default());

    let engine_task = tokio::spawn(async move { engine.run().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown().await;

    engine_task.await??;
    Ok(())
}

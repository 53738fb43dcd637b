//! Marker Reconciliation Engine
//!
//! Consumes a store snapshot plus the previously rendered marker set and
//! issues the minimal create/move/destroy intents to an external rendering
//! collaborator, then recomputes the viewport. The rendered set is owned
//! exclusively by the reconciler; no other component reads it.

use std::collections::{HashMap, HashSet};

use crate::models::{GeoPosition, LocationSample, PeerId};

/// Opaque handle to a drawn marker, issued by the rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

/// Axis-aligned bounding box over geographic positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn around(pos: GeoPosition) -> Self {
        BoundingBox {
            south: pos.latitude,
            west: pos.longitude,
            north: pos.latitude,
            east: pos.longitude,
        }
    }

    pub fn extend(&mut self, pos: GeoPosition) {
        self.south = self.south.min(pos.latitude);
        self.west = self.west.min(pos.longitude);
        self.north = self.north.max(pos.latitude);
        self.east = self.east.max(pos.longitude);
    }

    /// Bounds spanning every position, or None for an empty iterator.
    pub fn from_positions<I: IntoIterator<Item = GeoPosition>>(positions: I) -> Option<Self> {
        let mut iter = positions.into_iter();
        let mut bounds = BoundingBox::around(iter.next()?);
        for pos in iter {
            bounds.extend(pos);
        }
        Some(bounds)
    }

    pub fn contains(&self, pos: GeoPosition) -> bool {
        (self.south..=self.north).contains(&pos.latitude)
            && (self.west..=self.east).contains(&pos.longitude)
    }
}

/// External rendering collaborator. Any rendering technology (native map
/// widget, virtual DOM, immediate-mode canvas) can sit behind this.
pub trait MapRenderer {
    /// Draw a new marker. `is_self` tags the local client's own marker so
    /// the renderer can distinguish it (different icon, color, ...).
    fn create_marker(&mut self, peer: &PeerId, position: GeoPosition, is_self: bool)
        -> MarkerHandle;

    /// Move an existing marker, preserving its identity (continuity and
    /// animation are the renderer's business).
    fn move_marker(&mut self, handle: MarkerHandle, position: GeoPosition);

    fn destroy_marker(&mut self, handle: MarkerHandle);

    /// Fit the viewport to `bounds`, never zooming past `max_zoom`.
    fn fit_viewport(&mut self, bounds: BoundingBox, max_zoom: u8);

    /// Fall back to a fixed center and zoom when nothing is rendered.
    fn set_default_viewport(&mut self, center: GeoPosition, zoom: u8);
}

#[derive(Debug, Clone)]
struct RenderedMarker {
    handle: MarkerHandle,
    position: GeoPosition,
}

/// Viewport policy carried by the reconciler.
#[derive(Debug, Clone, Copy)]
pub struct ViewportPolicy {
    pub max_auto_zoom: u8,
    pub default_center: GeoPosition,
    pub default_zoom: u8,
}

pub struct MarkerReconciler {
    self_id: PeerId,
    rendered: HashMap<PeerId, RenderedMarker>,
    policy: ViewportPolicy,
}

impl MarkerReconciler {
    pub fn new(self_id: PeerId, policy: ViewportPolicy) -> Self {
        MarkerReconciler {
            self_id,
            rendered: HashMap::new(),
            policy,
        }
    }

    /// Number of markers currently rendered.
    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    /// Bring the rendered set in line with `snapshot`, emitting the minimal
    /// delta, then recompute the viewport.
    pub fn reconcile<R: MapRenderer>(
        &mut self,
        snapshot: &[(PeerId, LocationSample)],
        renderer: &mut R,
    ) {
        let live: HashSet<&PeerId> = snapshot.iter().map(|(id, _)| id).collect();

        // Creates and moves.
        for (peer, sample) in snapshot {
            match self.rendered.get_mut(peer) {
                None => {
                    let is_self = peer == &self.self_id;
                    let handle = renderer.create_marker(peer, sample.position, is_self);
                    self.rendered.insert(
                        peer.clone(),
                        RenderedMarker {
                            handle,
                            position: sample.position,
                        },
                    );
                }
                Some(marker) if marker.position != sample.position => {
                    renderer.move_marker(marker.handle, sample.position);
                    marker.position = sample.position;
                }
                Some(_) => {}
            }
        }

        // Destroys: rendered peers that left the snapshot.
        let gone: Vec<PeerId> = self
            .rendered
            .keys()
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();
        for peer in gone {
            if let Some(marker) = self.rendered.remove(&peer) {
                renderer.destroy_marker(marker.handle);
            }
        }

        // Viewport: fit to every rendered position, clamped, or fall back to
        // the fixed default when nothing is rendered.
        match BoundingBox::from_positions(self.rendered.values().map(|m| m.position)) {
            Some(bounds) => renderer.fit_viewport(bounds, self.policy.max_auto_zoom),
            None => {
                renderer.set_default_viewport(self.policy.default_center, self.policy.default_zoom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_single_point() {
        let b = BoundingBox::around(GeoPosition::new(10.0, 20.0));
        assert_eq!(b.south, 10.0);
        assert_eq!(b.north, 10.0);
        assert!(b.contains(GeoPosition::new(10.0, 20.0)));
    }

    #[test]
    fn test_bounds_extend() {
        let mut b = BoundingBox::around(GeoPosition::new(10.0, 20.0));
        b.extend(GeoPosition::new(-5.0, 25.0));
        assert_eq!(b.south, -5.0);
        assert_eq!(b.north, 10.0);
        assert_eq!(b.west, 20.0);
        assert_eq!(b.east, 25.0);
        assert!(b.contains(GeoPosition::new(0.0, 22.0)));
    }

    #[test]
    fn test_bounds_empty() {
        assert!(BoundingBox::from_positions(std::iter::empty()).is_none());
    }
}

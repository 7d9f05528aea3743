//! Click projection and the single-point pick cycle.
//!
//! A click arms a pick: the pointer position is projected into tile pixel
//! space, every visible tile re-renders, and painters append any feature
//! under the pointer to the cycle's accumulator. When the pick window
//! closes the first accumulated feature (if any) is reported and the
//! pointer is cleared.
//!
//! ```text
//!   idle ──click──► armed ──window elapsed──► idle
//!                    │  ▲                       (emits FeatureClick if a
//!                    └──┘ click restarts         feature was picked)
//! ```

use crate::coord::{self, LatLng, Point, TileCoord};
use crate::source::PickedFeature;

/// A click from the host. Only the position is read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    pub latlng: LatLng,
}

impl ClickEvent {
    pub fn new(latlng: LatLng) -> Self {
        Self { latlng }
    }
}

/// Click event enriched with the feature found under it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClick {
    pub event: ClickEvent,
    pub feature: PickedFeature,
}

/// Projected pointer position at one zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerState {
    /// Zoom the position was projected at.
    pub zoom: u8,
    /// Tile containing the pointer.
    pub tile: TileCoord,
    /// Device-pixel position inside `tile`.
    pub local: Point,
    /// Device-pixel position in the zoom's global pixel grid.
    pub global: Point,
}

impl PointerState {
    /// Local device-pixel position if the pointer falls inside `coord`.
    ///
    /// `tile_pixels` is the tile's width in device pixels.
    pub fn local_in(&self, coord: &TileCoord, tile_pixels: f64) -> Option<Point> {
        if self.zoom != coord.zoom {
            return None;
        }
        let origin = Point::new(coord.x as f64 * tile_pixels, coord.y as f64 * tile_pixels);
        let inside = self.global.x >= origin.x
            && self.global.x < origin.x + tile_pixels
            && self.global.y >= origin.y
            && self.global.y < origin.y + tile_pixels;
        inside.then(|| self.global.sub(&origin))
    }
}

/// Converts geographic clicks into tile pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PointerProjector {
    tile_pixels: f64,
}

impl PointerProjector {
    /// # Arguments
    ///
    /// * `tile_size` - Tile width in CSS pixels
    /// * `device_pixel_ratio` - Device pixels per CSS pixel
    pub fn new(tile_size: u32, device_pixel_ratio: f32) -> Self {
        Self {
            tile_pixels: tile_size as f64 * device_pixel_ratio as f64,
        }
    }

    /// Tile width in device pixels.
    pub fn tile_pixels(&self) -> f64 {
        self.tile_pixels
    }

    /// Project a click at `zoom`.
    pub fn project(&self, event: &ClickEvent, zoom: u8) -> PointerState {
        let world = coord::to_normalized(event.latlng);
        let n = 2.0_f64.powi(zoom as i32);
        let grid = world.scale(n);
        let tile_x = grid.x.floor();
        let tile_y = grid.y.floor();

        PointerState {
            zoom,
            tile: TileCoord::new(zoom, tile_x as u32, tile_y as u32),
            local: Point::new(
                (grid.x - tile_x) * self.tile_pixels,
                (grid.y - tile_y) * self.tile_pixels,
            ),
            global: grid.scale(self.tile_pixels),
        }
    }
}

/// Phase of the pick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickPhase {
    Idle,
    Armed,
}

/// Pointer snapshot taken by a render, tagged with the cycle it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickTicket {
    pub cycle: u64,
    pub pointer: PointerState,
}

/// Layer-wide pick state. At most one cycle is armed at a time.
#[derive(Debug, Default)]
pub struct PickCycle {
    cycle: u64,
    armed: Option<ArmedPick>,
}

#[derive(Debug)]
struct ArmedPick {
    event: ClickEvent,
    pointer: PointerState,
    picked: Vec<PickedFeature>,
}

impl PickCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PickPhase {
        if self.armed.is_some() {
            PickPhase::Armed
        } else {
            PickPhase::Idle
        }
    }

    /// Arm a new cycle, discarding any previous one. Returns the cycle id
    /// the window timer must present to [`resolve`](Self::resolve).
    pub fn arm(&mut self, event: ClickEvent, pointer: PointerState) -> u64 {
        self.cycle += 1;
        self.armed = Some(ArmedPick {
            event,
            pointer,
            picked: Vec::new(),
        });
        self.cycle
    }

    /// Current pointer, if a cycle is armed.
    pub fn ticket(&self) -> Option<PickTicket> {
        self.armed.as_ref().map(|armed| PickTicket {
            cycle: self.cycle,
            pointer: armed.pointer,
        })
    }

    /// Append features picked during a paint. Ignored unless `cycle` is
    /// still the armed one.
    pub fn record(&mut self, cycle: u64, features: Vec<PickedFeature>) {
        if cycle != self.cycle {
            return;
        }
        if let Some(armed) = self.armed.as_mut() {
            armed.picked.extend(features);
        }
    }

    /// Number of features accumulated in the armed cycle.
    pub fn picked_count(&self) -> usize {
        self.armed.as_ref().map_or(0, |armed| armed.picked.len())
    }

    /// Close the window for `cycle`. Returns the click to emit, if any.
    ///
    /// A stale `cycle` (restarted by a later click) leaves state untouched.
    pub fn resolve(&mut self, cycle: u64) -> Option<FeatureClick> {
        if cycle != self.cycle {
            return None;
        }
        let armed = self.armed.take()?;
        let feature = armed.picked.into_iter().next()?;
        Some(FeatureClick {
            event: armed.event,
            feature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::tile_center;
    use serde_json::Map;

    fn feature(id: u64) -> PickedFeature {
        PickedFeature {
            source: "base".into(),
            layer: "water".into(),
            feature_id: id,
            properties: Map::new(),
        }
    }

    #[test]
    fn test_project_tile_center() {
        let projector = PointerProjector::new(256, 1.0);
        let tile = TileCoord::new(9, 301, 187);
        let event = ClickEvent::new(tile_center(&tile));
        let state = projector.project(&event, 9);

        assert_eq!(state.tile, tile);
        assert!((state.local.x - 128.0).abs() < 1e-6);
        assert!((state.local.y - 128.0).abs() < 1e-6);
        assert!((state.global.x - (301.0 * 256.0 + 128.0)).abs() < 1e-6);
    }

    #[test]
    fn test_project_east_antimeridian_wraps_to_column_zero() {
        let projector = PointerProjector::new(256, 1.0);
        let state = projector.project(&ClickEvent::new(LatLng::new(0.0, 180.0)), 3);
        assert_eq!(state.tile.x, 0);
        assert!(state.local.x.abs() < 1e-9);
    }

    #[test]
    fn test_project_scales_with_device_pixel_ratio() {
        let projector = PointerProjector::new(256, 2.0);
        let tile = TileCoord::new(4, 3, 5);
        let state = projector.project(&ClickEvent::new(tile_center(&tile)), 4);
        assert_eq!(projector.tile_pixels(), 512.0);
        assert!((state.local.x - 256.0).abs() < 1e-6);
        assert!((state.local.y - 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_local_in_matches_only_containing_tile() {
        let projector = PointerProjector::new(256, 1.0);
        let tile = TileCoord::new(6, 10, 20);
        let state = projector.project(&ClickEvent::new(tile_center(&tile)), 6);

        let local = state.local_in(&tile, 256.0).unwrap();
        assert!((local.x - 128.0).abs() < 1e-6);
        assert!(state.local_in(&TileCoord::new(6, 11, 20), 256.0).is_none());
        assert!(state.local_in(&TileCoord::new(7, 20, 40), 256.0).is_none());
    }

    #[test]
    fn test_pick_cycle_emits_first_feature() {
        let projector = PointerProjector::new(256, 1.0);
        let event = ClickEvent::new(LatLng::new(0.0, 0.0));
        let mut cycle = PickCycle::new();
        assert_eq!(cycle.phase(), PickPhase::Idle);

        let id = cycle.arm(event, projector.project(&event, 3));
        assert_eq!(cycle.phase(), PickPhase::Armed);
        cycle.record(id, vec![feature(1), feature(2)]);

        let click = cycle.resolve(id).unwrap();
        assert_eq!(click.feature.feature_id, 1);
        assert_eq!(click.event, event);
        assert_eq!(cycle.phase(), PickPhase::Idle);
        assert!(cycle.ticket().is_none());
    }

    #[test]
    fn test_pick_cycle_empty_returns_to_idle() {
        let event = ClickEvent::new(LatLng::new(10.0, 10.0));
        let mut cycle = PickCycle::new();
        let id = cycle.arm(event, PointerProjector::new(256, 1.0).project(&event, 2));
        assert!(cycle.resolve(id).is_none());
        assert_eq!(cycle.phase(), PickPhase::Idle);
    }

    #[test]
    fn test_restart_discards_old_cycle() {
        let projector = PointerProjector::new(256, 1.0);
        let event = ClickEvent::new(LatLng::new(0.0, 0.0));
        let mut cycle = PickCycle::new();

        let first = cycle.arm(event, projector.project(&event, 3));
        cycle.record(first, vec![feature(1)]);
        let second = cycle.arm(event, projector.project(&event, 3));
        assert_eq!(cycle.picked_count(), 0, "restart clears the accumulator");

        cycle.record(first, vec![feature(9)]);
        assert_eq!(cycle.picked_count(), 0, "late paints from old cycle ignored");
        assert!(cycle.resolve(first).is_none());
        assert_eq!(cycle.phase(), PickPhase::Armed);

        cycle.record(second, vec![feature(2)]);
        assert_eq!(cycle.resolve(second).unwrap().feature.feature_id, 2);
    }
}

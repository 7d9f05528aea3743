//! Host viewport.
//!
//! The coordinator asks the host for three things: whether the layer is
//! still attached, the current zoom, and the pixel bounds of the view at a
//! zoom. The tile range covering those bounds, and its center, drive the
//! priority delay.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::coord::{self, BBox, LatLng, Point, TileRange};

/// Read-only view of the host map.
pub trait Viewport: Send + Sync {
    /// Whether the layer is attached to a live map.
    fn is_attached(&self) -> bool;

    /// Current map zoom.
    fn zoom(&self) -> u8;

    /// Current map center.
    fn center(&self) -> LatLng;

    /// Visible area at `zoom` in CSS pixels of the zoom's global grid.
    fn pixel_bounds(&self, zoom: u8) -> BBox;

    /// Tile size in CSS pixels used to divide the pixel bounds.
    fn tile_size(&self) -> u32;

    /// Tile range covering the visible area at `zoom`.
    fn tile_range(&self, zoom: u8) -> TileRange {
        TileRange::from_pixel_bounds(&self.pixel_bounds(zoom), self.tile_size() as f64)
    }

    /// Center of [`tile_range`](Self::tile_range), in tile-grid units.
    fn tile_range_center(&self, zoom: u8) -> Point {
        self.tile_range(zoom).center()
    }
}

#[derive(Debug, Clone, Copy)]
struct View {
    center: LatLng,
    zoom: u8,
    width: f64,
    height: f64,
}

/// A viewport whose center, zoom, and size are set directly.
///
/// Used by the CLI and tests in place of an interactive map.
#[derive(Debug)]
pub struct StaticViewport {
    view: RwLock<View>,
    tile_size: u32,
    attached: AtomicBool,
}

impl StaticViewport {
    /// # Arguments
    ///
    /// * `center` - Map center
    /// * `zoom` - Map zoom
    /// * `size` - View width and height in CSS pixels
    /// * `tile_size` - Tile width in CSS pixels
    pub fn new(center: LatLng, zoom: u8, size: (f64, f64), tile_size: u32) -> Self {
        Self {
            view: RwLock::new(View {
                center,
                zoom,
                width: size.0,
                height: size.1,
            }),
            tile_size: tile_size.max(1),
            attached: AtomicBool::new(true),
        }
    }

    pub fn set_view(&self, center: LatLng, zoom: u8) {
        let mut view = self.view.write();
        view.center = center;
        view.zoom = zoom;
    }

    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }
}

impl Viewport for StaticViewport {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn zoom(&self) -> u8 {
        self.view.read().zoom
    }

    fn center(&self) -> LatLng {
        self.view.read().center
    }

    fn pixel_bounds(&self, zoom: u8) -> BBox {
        let view = *self.view.read();
        let world = self.tile_size as f64 * 2.0_f64.powi(zoom as i32);
        let center = coord::to_normalized(view.center).scale(world);
        BBox::around(center, view.width, view.height)
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

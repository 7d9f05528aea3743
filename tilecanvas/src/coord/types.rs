//! Coordinate value types shared by every render stage.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum valid latitude for Web Mercator projection.
pub const MIN_LAT: f64 = -85.0511287798;

/// Maximum valid latitude for Web Mercator projection.
pub const MAX_LAT: f64 = 85.0511287798;

/// Minimum valid longitude.
pub const MIN_LON: f64 = -180.0;

/// Minimum zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum zoom level addressable by a `TileCoord`.
pub const MAX_ZOOM: u8 = 24;

/// Width of a tile in the fixed local tile space, before device scaling.
pub const TILE_UNITS: f64 = 256.0;

/// Errors produced when building coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside the Web Mercator range.
    #[error("Invalid latitude: {0} (must be between {MIN_LAT} and {MAX_LAT})")]
    InvalidLatitude(f64),

    /// Longitude outside -180..=180.
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    /// Zoom above `MAX_ZOOM`.
    #[error("Invalid zoom level: {0} (must be between {MIN_ZOOM} and {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Tile index outside the grid for its zoom.
    #[error("Tile {x}/{y} is outside the grid at zoom {zoom}")]
    OutOfGrid { zoom: u8, x: u32, y: u32 },
}

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A 2D point. Used for tile-space units, normalized world space and pixels
/// depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Axis-aligned bounding box. `min` is inclusive, `max` exclusive for
/// containment tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box of the given size centered on `center`.
    pub fn around(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y - height / 2.0,
            center.x + width / 2.0,
            center.y + height / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min_x && p.x < self.max_x && p.y >= self.min_y && p.y < self.max_y
    }

    /// True when the boxes overlap with positive area.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    /// Grow the box by `buffer` on every side.
    pub fn buffered(&self, buffer: f64) -> BBox {
        BBox::new(
            self.min_x - buffer,
            self.min_y - buffer,
            self.max_x + buffer,
            self.max_y + buffer,
        )
    }
}

/// Tile address in a zoom level's grid.
///
/// `x` increases eastward and `y` southward, both in `0..2^zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Build a coordinate, validating zoom and grid bounds.
    pub fn try_new(zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let n = 1u64 << zoom;
        if x as u64 >= n || y as u64 >= n {
            return Err(CoordError::OutOfGrid { zoom, x, y });
        }
        Ok(Self { zoom, x, y })
    }

    /// Number of tiles along one axis at this zoom. Saturates past zoom 63.
    pub fn grid_size(&self) -> u64 {
        1u64.checked_shl(u32::from(self.zoom)).unwrap_or(u64::MAX)
    }

    /// The tile at `zoom` that contains this one. Returns `None` when `zoom`
    /// is deeper than this tile.
    pub fn ancestor(&self, zoom: u8) -> Option<TileCoord> {
        if zoom > self.zoom {
            return None;
        }
        let shift = self.zoom - zoom;
        Some(TileCoord::new(zoom, self.x >> shift, self.y >> shift))
    }

    /// Top-left corner in the 256-unit global space of this tile's zoom.
    pub fn origin(&self) -> Point {
        Point::new(self.x as f64 * TILE_UNITS, self.y as f64 * TILE_UNITS)
    }

    /// Tile bounds in the 256-unit global space, grown by `buffer` units.
    pub fn bbox(&self, buffer: f64) -> BBox {
        let origin = self.origin();
        BBox::new(origin.x, origin.y, origin.x + TILE_UNITS, origin.y + TILE_UNITS).buffered(buffer)
    }

    /// Label-index key in `x:y:z` form.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.x, self.y, self.zoom)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Opaque token tagging a tile element for one render request.
///
/// Two keys compare equal only if they were produced by the same assignment.
/// Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationKey(Arc<str>);

impl GenerationKey {
    /// Key for the `generation`-th assignment of a slot showing `coord`.
    pub fn new(coord: &TileCoord, generation: u64) -> Self {
        Self(Arc::from(format!("{}#{}", coord.key(), generation)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive range of tile indices covering a pixel area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRange {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl TileRange {
    /// Tiles touched by the pixel rectangle `bounds` for tiles `tile_size`
    /// pixels wide. The upper edge is exclusive.
    pub fn from_pixel_bounds(bounds: &BBox, tile_size: f64) -> Self {
        Self {
            min_x: (bounds.min_x / tile_size).floor() as i64,
            min_y: (bounds.min_y / tile_size).floor() as i64,
            max_x: (bounds.max_x / tile_size).ceil() as i64 - 1,
            max_y: (bounds.max_y / tile_size).ceil() as i64 - 1,
        }
    }

    /// Center of the range in tile-grid units. Not rounded.
    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) as f64 / 2.0,
            (self.min_y + self.max_y) as f64 / 2.0,
        )
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        let (x, y) = (coord.x as i64, coord.y as i64);
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Tiles in the range at `zoom`, clipped to the grid, row-major. Empty
    /// above [`MAX_ZOOM`].
    pub fn tiles(&self, zoom: u8) -> Vec<TileCoord> {
        if zoom > MAX_ZOOM {
            return Vec::new();
        }
        let n = 1i64 << zoom;
        let mut tiles = Vec::new();
        for y in self.min_y.max(0)..=self.max_y.min(n - 1) {
            for x in self.min_x.max(0)..=self.max_x.min(n - 1) {
                tiles.push(TileCoord::new(zoom, x as u32, y as u32));
            }
        }
        tiles
    }
}

//! Vector tile source abstraction
//!
//! A source view resolves a requested [`TileCoord`] into prepared data that
//! the painter and label index can consume. Sources may serve a requested
//! tile from a different zoom's data (overzooming), so each result carries
//! its own data-tile coordinate, dimension and origin.
//!
//! # Errors
//!
//! A fetch that was cancelled because its request is no longer current
//! fails with [`SourceError::Superseded`]. Renderers drop these silently and
//! log every other failure.

mod feature;
mod memory;

pub use feature::{Feature, Geometry, PickedFeature, TileData, TILE_EXTENT};
pub use memory::MemorySource;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::coord::{LatLng, Point, TileCoord};

/// Errors that can occur while fetching tile data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// The request was replaced by a newer one before it finished.
    #[error("Request superseded")]
    Superseded,

    /// The fetch failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The source holds no data at or below this zoom.
    #[error("Unsupported zoom level: {0}")]
    UnsupportedZoom(u8),

    /// Source data could not be decoded.
    #[error("Invalid source data: {0}")]
    InvalidData(String),
}

impl SourceError {
    /// Cancellation-type failures are expected and never reported.
    pub fn is_superseded(&self) -> bool {
        matches!(self, SourceError::Superseded)
    }
}

/// Data prepared by one source for one requested tile.
#[derive(Debug, Clone)]
pub struct PreparedSourceTile {
    /// Tile the data actually belongs to. Differs from the requested tile
    /// when overzoomed.
    pub data_coord: TileCoord,

    /// Decoded features in `0..TILE_EXTENT` local units.
    pub data: Arc<TileData>,

    /// Width of the data tile in the requested zoom's 256-unit space.
    pub dim: f64,

    /// Top-left of the data tile in the requested zoom's 256-unit global space.
    pub origin: Point,
}

impl PreparedSourceTile {
    /// Prepare `data` from `data_coord` for display at `requested`.
    ///
    /// `requested` must be at or below `data_coord` in the pyramid.
    pub fn for_request(requested: &TileCoord, data_coord: TileCoord, data: Arc<TileData>) -> Self {
        let depth = requested.zoom.saturating_sub(data_coord.zoom);
        let dim = crate::coord::TILE_UNITS * 2.0_f64.powi(i32::from(depth));
        Self {
            data_coord,
            data,
            dim,
            origin: Point::new(data_coord.x as f64 * dim, data_coord.y as f64 * dim),
        }
    }

    /// Multiplier from local extent units to 256-unit space.
    pub fn scale(&self) -> f64 {
        self.dim / TILE_EXTENT
    }

    /// Convert a point in the requested zoom's 256-unit global space to
    /// this tile's local extent units.
    pub fn to_local(&self, global: &Point) -> Point {
        global.sub(&self.origin).scale(1.0 / self.scale())
    }

    /// Convert a local extent-unit point to 256-unit global space.
    pub fn to_global(&self, local: &Point) -> Point {
        local.scale(self.scale()).add(&self.origin)
    }
}

/// Per-source results for one render attempt, keyed by source name.
///
/// Each entry holds exactly one prepared tile.
pub type PreparedTileMap = BTreeMap<String, Vec<PreparedSourceTile>>;

/// A named provider of vector tile data.
pub trait SourceView: Send + Sync {
    /// Resolve `coord` into data for display.
    ///
    /// May fail with [`SourceError::Superseded`] when the source abandons the
    /// request.
    fn fetch_for_display(
        &self,
        coord: TileCoord,
    ) -> BoxFuture<'_, Result<Vec<PreparedSourceTile>, SourceError>>;

    /// Features within `brush_radius` pixels of `position` at `zoom`.
    fn query_features(&self, position: LatLng, zoom: u8, brush_radius: f64) -> Vec<PickedFeature>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_classification() {
        assert!(SourceError::Superseded.is_superseded());
        assert!(!SourceError::Fetch("timeout".into()).is_superseded());
    }

    #[test]
    fn test_prepared_tile_same_zoom() {
        let coord = TileCoord::new(3, 2, 5);
        let tile = PreparedSourceTile::for_request(&coord, coord, Arc::default());
        assert_eq!(tile.dim, 256.0);
        assert_eq!(tile.origin, Point::new(512.0, 1280.0));
        assert_eq!(tile.scale(), 256.0 / TILE_EXTENT);
    }

    #[test]
    fn test_prepared_tile_overzoomed_origin() {
        let requested = TileCoord::new(5, 13, 6);
        let data_coord = requested.ancestor(3).unwrap();
        let tile = PreparedSourceTile::for_request(&requested, data_coord, Arc::default());

        assert_eq!(data_coord, TileCoord::new(3, 3, 1));
        assert_eq!(tile.dim, 1024.0);
        assert_eq!(tile.origin, Point::new(3072.0, 1024.0));

        // The requested tile's origin sits a quarter of the way into the data tile.
        let local = tile.to_local(&requested.origin());
        assert_eq!(local, Point::new(TILE_EXTENT / 4.0, TILE_EXTENT / 2.0));
        assert_eq!(tile.to_global(&local), requested.origin());
    }

    #[test]
    fn test_prepared_tile_deep_overzoom_stays_finite() {
        let requested = TileCoord::new(80, 0, 0);
        let data_coord = TileCoord::new(0, 0, 0);
        let tile = PreparedSourceTile::for_request(&requested, data_coord, Arc::default());
        assert!(tile.dim.is_finite());
        assert_eq!(tile.dim, 256.0 * 2.0_f64.powi(80));
    }
}

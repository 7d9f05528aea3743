//! Label index
//!
//! Per-zoom cache of laid-out label placements shared by every tile render
//! of a layer. Renders feed their prepared tiles in with [`LabelIndex::add`]
//! and read the zoom's placements back with [`LabelIndex::get_index`].
//!
//! When a newly placed label overlaps display tiles that already rendered,
//! the index reports those tiles through the invalidation callback supplied
//! at construction so they can be re-rendered. The callback runs on the
//! caller's thread after the index lock is released.

mod layout;

pub use layout::{GreedyLayout, LabelPlacement, LabelRule, MonospaceMeasure, TextMeasure};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::coord::TileCoord;
use crate::source::PreparedTileMap;

/// Receives display tiles whose labels changed after they rendered.
pub type InvalidationCallback = Box<dyn Fn(HashSet<TileCoord>) + Send + Sync>;

/// Shared label placement cache.
pub struct LabelIndex {
    measure: Arc<dyn TextMeasure>,
    rules: Vec<LabelRule>,
    tile_size: f64,
    on_invalidate: InvalidationCallback,
    zooms: Mutex<HashMap<u8, GreedyLayout>>,
}

impl std::fmt::Debug for LabelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelIndex")
            .field("rules", &self.rules.len())
            .field("tile_size", &self.tile_size)
            .field("zooms", &self.zooms.lock().len())
            .finish()
    }
}

impl LabelIndex {
    /// Create an empty index.
    ///
    /// # Arguments
    ///
    /// * `measure` - Text measurement for sizing label boxes
    /// * `rules` - Label rules in priority order
    /// * `tile_size` - Tile width in CSS pixels
    /// * `on_invalidate` - Called with tiles needing a re-render
    pub fn new(
        measure: Arc<dyn TextMeasure>,
        rules: Vec<LabelRule>,
        tile_size: u32,
        on_invalidate: InvalidationCallback,
    ) -> Self {
        Self {
            measure,
            rules,
            tile_size: tile_size.max(1) as f64,
            on_invalidate,
            zooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &[LabelRule] {
        &self.rules
    }

    /// Lay out labels from `tile_map` at `zoom`. Returns the time spent.
    pub fn add(&self, zoom: u8, tile_map: &PreparedTileMap) -> Duration {
        let start = Instant::now();
        let invalidated = {
            let mut zooms = self.zooms.lock();
            zooms.entry(zoom).or_default().layout(
                zoom,
                tile_map,
                &self.rules,
                self.measure.as_ref(),
                self.tile_size,
            )
        };
        let elapsed = start.elapsed();

        if !invalidated.is_empty() {
            debug!(zoom, tiles = invalidated.len(), "Labels invalidated rendered tiles");
            (self.on_invalidate)(invalidated);
        }
        elapsed
    }

    /// Placements at `zoom`. Empty if nothing has been laid out.
    pub fn get_index(&self, zoom: u8) -> Arc<Vec<LabelPlacement>> {
        self.zooms
            .lock()
            .get(&zoom)
            .map(GreedyLayout::placements)
            .unwrap_or_default()
    }

    /// Discard every placement at every zoom.
    pub fn clear_layout(&self) {
        self.zooms.lock().clear();
        debug!("Label layout cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Point, TILE_UNITS};
    use crate::source::{Feature, Geometry, PreparedSourceTile, TileData, TILE_EXTENT};
    use serde_json::{Map, Value};

    fn named_point(id: u64, x: f64, y: f64, name: &str) -> Feature {
        let mut properties = Map::new();
        properties.insert("name".into(), Value::from(name));
        Feature {
            id,
            geometry: Geometry::Points(vec![Point::new(x, y)]),
            properties,
        }
    }

    fn tile_map(coord: TileCoord, features: Vec<Feature>) -> PreparedTileMap {
        let mut data = TileData::default();
        data.layers.insert("places".into(), features);
        let prepared = PreparedSourceTile::for_request(&coord, coord, Arc::new(data));
        let mut map = PreparedTileMap::new();
        map.insert("base".into(), vec![prepared]);
        map
    }

    fn index_with_sink() -> (LabelIndex, Arc<Mutex<Vec<HashSet<TileCoord>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let index = LabelIndex::new(
            Arc::new(MonospaceMeasure),
            vec![LabelRule::new("places", "name")],
            256,
            Box::new(move |tiles: HashSet<TileCoord>| sink.lock().push(tiles)),
        );
        (index, seen)
    }

    #[test]
    fn test_add_then_get_index() {
        let (index, _) = index_with_sink();
        let coord = TileCoord::new(4, 3, 3);
        index.add(4, &tile_map(coord, vec![named_point(1, 2048.0, 2048.0, "Port")]));

        let placements = index.get_index(4);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].text, "Port");
        assert_eq!(placements[0].anchor, Point::new(3.0 * 256.0 + 128.0, 3.0 * 256.0 + 128.0));
        assert!(index.get_index(5).is_empty());
    }

    #[test]
    fn test_placements_are_monotonic() {
        let (index, _) = index_with_sink();
        index.add(4, &tile_map(TileCoord::new(4, 3, 3), vec![named_point(1, 2048.0, 2048.0, "A")]));
        let first = index.get_index(4);

        index.add(4, &tile_map(TileCoord::new(4, 8, 8), vec![named_point(2, 2048.0, 2048.0, "B")]));
        let second = index.get_index(4);

        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|p| second.contains(p)));
    }

    #[test]
    fn test_colliding_label_is_dropped() {
        let (index, _) = index_with_sink();
        let features = vec![
            named_point(1, 2048.0, 2048.0, "Harbor"),
            named_point(2, 2060.0, 2050.0, "Dock"),
        ];
        index.add(6, &tile_map(TileCoord::new(6, 10, 10), features));
        let placements = index.get_index(6);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].feature_id, 1);
    }

    #[test]
    fn test_readding_same_tile_is_noop() {
        let (index, _) = index_with_sink();
        let map = tile_map(TileCoord::new(4, 3, 3), vec![named_point(1, 2048.0, 2048.0, "A")]);
        index.add(4, &map);
        index.add(4, &map);
        assert_eq!(index.get_index(4).len(), 1);
    }

    #[test]
    fn test_clear_layout_empties_every_zoom() {
        let (index, _) = index_with_sink();
        index.add(4, &tile_map(TileCoord::new(4, 3, 3), vec![named_point(1, 2048.0, 2048.0, "A")]));
        index.add(5, &tile_map(TileCoord::new(5, 3, 3), vec![named_point(1, 2048.0, 2048.0, "A")]));
        index.clear_layout();
        assert!(index.get_index(4).is_empty());
        assert!(index.get_index(5).is_empty());
    }

    #[test]
    fn test_overflowing_label_invalidates_rendered_neighbor() {
        let (index, seen) = index_with_sink();
        let left = TileCoord::new(5, 10, 10);
        let right = TileCoord::new(5, 11, 10);

        index.add(5, &tile_map(right, vec![]));
        assert!(seen.lock().is_empty());

        // Anchor one unit from the right edge of `left`; the box spills over.
        let x = (255.0 / TILE_UNITS) * TILE_EXTENT;
        index.add(5, &tile_map(left, vec![named_point(1, x, 2048.0, "Crossing")]));

        let calls = seen.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(&right));
        assert!(!calls[0].contains(&left));
    }

    #[test]
    fn test_overflow_into_unrendered_tile_is_silent() {
        let (index, seen) = index_with_sink();
        let x = (255.0 / TILE_UNITS) * TILE_EXTENT;
        index.add(5, &tile_map(TileCoord::new(5, 10, 10), vec![named_point(1, x, 2048.0, "Crossing")]));
        assert!(seen.lock().is_empty());
    }
}

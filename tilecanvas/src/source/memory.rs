//! In-memory vector source.
//!
//! Holds features in the normalized world plane and slices them into data
//! tiles on demand. Requests deeper than `max_data_zoom` are served from the
//! ancestor tile at `max_data_zoom` (overzoom). Sliced tiles are memoized.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::coord::{self, BBox, LatLng, Point, TileCoord, MAX_ZOOM, TILE_UNITS};

use super::feature::{Feature, Geometry, PickedFeature, TileData, TILE_EXTENT};
use super::{PreparedSourceTile, SourceError, SourceView};

/// Fraction of a tile's width included around it when slicing, so strokes
/// and markers near an edge are not cut off.
const SLICE_BUFFER: f64 = 1.0 / 16.0;

struct WorldFeature {
    feature: Feature,
    bbox: BBox,
}

/// Vector source backed by features held in memory.
pub struct MemorySource {
    name: String,
    max_data_zoom: u8,
    layers: BTreeMap<String, Vec<WorldFeature>>,
    tiles: DashMap<TileCoord, Arc<TileData>>,
}

impl MemorySource {
    /// Create an empty source.
    ///
    /// # Arguments
    ///
    /// * `name` - Source name reported on picked features
    /// * `max_data_zoom` - Deepest zoom data is sliced at
    pub fn new(name: impl Into<String>, max_data_zoom: u8) -> Self {
        Self {
            name: name.into(),
            max_data_zoom,
            layers: BTreeMap::new(),
            tiles: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_data_zoom(&self) -> u8 {
        self.max_data_zoom
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Add a feature whose geometry is in the normalized world plane.
    pub fn add_feature(&mut self, layer: impl Into<String>, feature: Feature) {
        let bbox = feature.geometry.bbox();
        self.layers
            .entry(layer.into())
            .or_default()
            .push(WorldFeature { feature, bbox });
        self.tiles.clear();
    }

    /// Add a feature with geometry given as `(lng, lat)` degrees.
    pub fn add_geographic(
        &mut self,
        layer: impl Into<String>,
        id: u64,
        geometry: &Geometry,
        properties: Map<String, Value>,
    ) {
        let geometry = geometry.map_points(|p| coord::to_normalized(LatLng::new(p.y, p.x)));
        self.add_feature(
            layer,
            Feature {
                id,
                geometry,
                properties,
            },
        );
    }

    /// Load a source from a JSON document of the form
    /// `{"layers": {"<name>": [{"id": 1, "geometry": {...}, "properties": {...}}]}}`
    /// where geometries use GeoJSON `Point`, `MultiPoint`, `LineString`,
    /// `MultiLineString` or `Polygon` with `[lng, lat]` positions.
    pub fn from_json(
        name: impl Into<String>,
        max_data_zoom: u8,
        json: &str,
    ) -> Result<Self, SourceError> {
        let collection: JsonCollection =
            serde_json::from_str(json).map_err(|e| SourceError::InvalidData(e.to_string()))?;

        let mut source = Self::new(name, max_data_zoom);
        let mut next_id = 1u64;
        for (layer, features) in collection.layers {
            for feature in features {
                let id = feature.id.unwrap_or(next_id);
                next_id = next_id.max(id) + 1;
                source.add_geographic(
                    layer.clone(),
                    id,
                    &feature.geometry.into_geometry(),
                    feature.properties,
                );
            }
        }
        Ok(source)
    }

    /// Data-tile coordinate serving a request for `coord`.
    pub fn data_coord(&self, coord: &TileCoord) -> TileCoord {
        let zoom = coord.zoom.min(self.max_data_zoom);
        coord.ancestor(zoom).unwrap_or(*coord)
    }

    /// Slice (or fetch the memoized slice of) a data tile.
    pub fn tile_data(&self, data_coord: TileCoord) -> Arc<TileData> {
        if let Some(existing) = self.tiles.get(&data_coord) {
            return Arc::clone(existing.value());
        }
        let data = Arc::new(self.slice(&data_coord));
        self.tiles.insert(data_coord, Arc::clone(&data));
        data
    }

    fn slice(&self, data_coord: &TileCoord) -> TileData {
        let n = data_coord.grid_size() as f64;
        let (x, y) = (data_coord.x as f64, data_coord.y as f64);
        let bounds = BBox::new(x / n, y / n, (x + 1.0) / n, (y + 1.0) / n).buffered(SLICE_BUFFER / n);

        let mut data = TileData::default();
        for (layer, features) in &self.layers {
            let sliced: Vec<Feature> = features
                .iter()
                .filter(|wf| wf.bbox.intersects(&bounds))
                .map(|wf| Feature {
                    id: wf.feature.id,
                    geometry: wf.feature.geometry.map_points(|p| {
                        Point::new((p.x * n - x) * TILE_EXTENT, (p.y * n - y) * TILE_EXTENT)
                    }),
                    properties: wf.feature.properties.clone(),
                })
                .collect();
            if !sliced.is_empty() {
                data.layers.insert(layer.clone(), sliced);
            }
        }

        debug!(
            source = %self.name,
            tile = %data_coord,
            features = data.feature_count(),
            "Sliced data tile"
        );
        data
    }
}

impl SourceView for MemorySource {
    fn fetch_for_display(
        &self,
        coord: TileCoord,
    ) -> BoxFuture<'_, Result<Vec<PreparedSourceTile>, SourceError>> {
        async move {
            if coord.zoom > MAX_ZOOM {
                return Err(SourceError::UnsupportedZoom(coord.zoom));
            }
            let data_coord = self.data_coord(&coord);
            let data = self.tile_data(data_coord);
            Ok(vec![PreparedSourceTile::for_request(&coord, data_coord, data)])
        }
        .boxed()
    }

    fn query_features(&self, position: LatLng, zoom: u8, brush_radius: f64) -> Vec<PickedFeature> {
        let point = coord::to_normalized(position);
        let tolerance = brush_radius / (TILE_UNITS * 2.0_f64.powi(zoom as i32));

        self.layers
            .iter()
            .flat_map(|(layer, features)| {
                features
                    .iter()
                    .filter(move |wf| wf.feature.geometry.hit(&point, tolerance))
                    .map(move |wf| PickedFeature {
                        source: self.name.clone(),
                        layer: layer.clone(),
                        feature_id: wf.feature.id,
                        properties: wf.feature.properties.clone(),
                    })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON input
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonCollection {
    layers: BTreeMap<String, Vec<JsonFeature>>,
}

#[derive(Deserialize)]
struct JsonFeature {
    #[serde(default)]
    id: Option<u64>,
    geometry: JsonGeometry,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum JsonGeometry {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl JsonGeometry {
    fn into_geometry(self) -> Geometry {
        let ring = |positions: Vec<[f64; 2]>| -> Vec<Point> {
            positions.into_iter().map(|[x, y]| Point::new(x, y)).collect()
        };
        match self {
            JsonGeometry::Point([x, y]) => Geometry::Points(vec![Point::new(x, y)]),
            JsonGeometry::MultiPoint(points) => Geometry::Points(ring(points)),
            JsonGeometry::LineString(line) => Geometry::Lines(vec![ring(line)]),
            JsonGeometry::MultiLineString(lines) => {
                Geometry::Lines(lines.into_iter().map(ring).collect())
            }
            JsonGeometry::Polygon(rings) => Geometry::Polygon(rings.into_iter().map(ring).collect()),
        }
    }
}

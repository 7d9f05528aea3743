//! Vector feature model and point hit-testing.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::coord::{BBox, Point};

/// Local coordinate extent of a data tile. Geometry inside a
/// [`TileData`] uses `0..TILE_EXTENT` on both axes.
pub const TILE_EXTENT: f64 = 4096.0;

/// Feature geometry. Coordinates are in whatever space the owner uses
/// (normalized world space in sources, tile-local extent units in tiles).
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Points(Vec<Point>),
    Lines(Vec<Vec<Point>>),
    /// Rings, outer first. Holes are handled by the even-odd rule.
    Polygon(Vec<Vec<Point>>),
}

impl Geometry {
    /// Bounding box of every vertex.
    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        self.for_each_vertex(|p| {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        });
        bbox
    }

    /// Apply `f` to every vertex, producing a new geometry.
    pub fn map_points(&self, f: impl Fn(&Point) -> Point) -> Geometry {
        let map_ring = |ring: &Vec<Point>| ring.iter().map(&f).collect::<Vec<_>>();
        match self {
            Geometry::Points(points) => Geometry::Points(points.iter().map(&f).collect()),
            Geometry::Lines(lines) => Geometry::Lines(lines.iter().map(map_ring).collect()),
            Geometry::Polygon(rings) => Geometry::Polygon(rings.iter().map(map_ring).collect()),
        }
    }

    fn for_each_vertex(&self, mut f: impl FnMut(&Point)) {
        match self {
            Geometry::Points(points) => points.iter().for_each(f),
            Geometry::Lines(parts) | Geometry::Polygon(parts) => {
                for part in parts {
                    part.iter().for_each(&mut f);
                }
            }
        }
    }

    /// Representative anchor for a label: the first point, the middle vertex
    /// of the first line, or the vertex average of the outer ring.
    pub fn anchor(&self) -> Option<Point> {
        match self {
            Geometry::Points(points) => points.first().copied(),
            Geometry::Lines(lines) => {
                let line = lines.first()?;
                line.get(line.len() / 2).copied()
            }
            Geometry::Polygon(rings) => {
                let ring = rings.first()?;
                if ring.is_empty() {
                    return None;
                }
                let sum = ring.iter().fold(Point::default(), |acc, p| acc.add(p));
                Some(sum.scale(1.0 / ring.len() as f64))
            }
        }
    }

    /// Whether `p` touches the geometry within `tolerance` units.
    ///
    /// Polygons also match any point inside them.
    pub fn hit(&self, p: &Point, tolerance: f64) -> bool {
        match self {
            Geometry::Points(points) => points.iter().any(|q| q.distance_to(p) <= tolerance),
            Geometry::Lines(lines) => lines
                .iter()
                .any(|line| polyline_distance(line, p) <= tolerance),
            Geometry::Polygon(rings) => {
                let inside = rings
                    .iter()
                    .filter(|ring| ring_contains(ring, p))
                    .count()
                    % 2
                    == 1;
                inside || rings.iter().any(|ring| polyline_distance(ring, p) <= tolerance)
            }
        }
    }
}

fn segment_distance(a: &Point, b: &Point, p: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return a.distance_to(p);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    Point::new(a.x + t * dx, a.y + t * dy).distance_to(p)
}

fn polyline_distance(line: &[Point], p: &Point) -> f64 {
    match line {
        [] => f64::INFINITY,
        [only] => only.distance_to(p),
        _ => line
            .windows(2)
            .map(|w| segment_distance(&w[0], &w[1], p))
            .fold(f64::INFINITY, f64::min),
    }
}

fn ring_contains(ring: &[Point], p: &Point) -> bool {
    let mut inside = false;
    let mut j = ring.len().wrapping_sub(1);
    for i in 0..ring.len() {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// One vector feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: u64,
    pub geometry: Geometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// String value of a property, if present. Numbers are formatted.
    pub fn property_text(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Decoded contents of one data tile: features grouped by layer name.
///
/// Geometry is in `0..TILE_EXTENT` local units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileData {
    pub layers: BTreeMap<String, Vec<Feature>>,
}

impl TileData {
    pub fn layer(&self, name: &str) -> &[Feature] {
        self.layers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn feature_count(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }
}

/// A feature found by a pick or a debug query.
#[derive(Debug, Clone, PartialEq)]
pub struct PickedFeature {
    pub source: String,
    pub layer: String,
    pub feature_id: u64,
    pub properties: Map<String, Value>,
}

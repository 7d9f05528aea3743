//! Greedy collision layout for one zoom level.
//!
//! Labels are placed in rule order, then feature order. A candidate is
//! dropped if its box overlaps any label already placed at the zoom, so
//! placements only ever accumulate. Each data tile is laid out once per
//! source; later renders that reuse it add nothing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::coord::{BBox, Point, TileCoord, MAX_ZOOM, TILE_UNITS};
use crate::paint::Color;
use crate::source::PreparedTileMap;

/// Which features get labels and how they look.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    /// Restrict to one source. `None` matches every source.
    pub source: Option<String>,
    pub layer: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Feature property holding the label text.
    pub text_property: String,
    /// Font size in CSS pixels.
    pub font_size: f64,
    pub color: Color,
}

impl LabelRule {
    pub fn new(layer: impl Into<String>, text_property: impl Into<String>) -> Self {
        Self {
            source: None,
            layer: layer.into(),
            min_zoom: 0,
            max_zoom: u8::MAX,
            text_property: text_property.into(),
            font_size: 12.0,
            color: Color::BLACK,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    fn applies(&self, source: &str, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
            && self.source.as_deref().map_or(true, |s| s == source)
    }
}

/// Text measurement used to size label boxes.
pub trait TextMeasure: Send + Sync {
    /// Width and height of `text` at `font_size`, in CSS pixels.
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64);
}

/// Fixed-advance approximation: every glyph is `0.6em` wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonospaceMeasure;

impl TextMeasure for MonospaceMeasure {
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64) {
        (text.chars().count() as f64 * font_size * 0.6, font_size * 1.2)
    }
}

/// A placed label in the zoom's 256-unit global space.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPlacement {
    pub text: String,
    pub anchor: Point,
    pub bbox: BBox,
    pub source: String,
    /// Data tile the label was derived from.
    pub data_coord: TileCoord,
    pub feature_id: u64,
    pub font_size: f64,
    pub color: Color,
}

/// Accumulated placements for one zoom level.
#[derive(Debug, Default)]
pub struct GreedyLayout {
    placements: Arc<Vec<LabelPlacement>>,
    laid_out: HashSet<(String, TileCoord)>,
    data_tiles: HashSet<TileCoord>,
}

impl GreedyLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every placement so far.
    pub fn placements(&self) -> Arc<Vec<LabelPlacement>> {
        Arc::clone(&self.placements)
    }

    /// Lay out any data tiles in `tile_map` not seen before.
    ///
    /// Returns display tiles at `zoom` that were already laid out and now
    /// overlap a new label.
    pub fn layout(
        &mut self,
        zoom: u8,
        tile_map: &PreparedTileMap,
        rules: &[LabelRule],
        measure: &dyn TextMeasure,
        tile_size: f64,
    ) -> HashSet<TileCoord> {
        let units_per_pixel = TILE_UNITS / tile_size;
        let mut invalidated = HashSet::new();

        for (source, tiles) in tile_map {
            for prepared in tiles {
                let key = (source.clone(), prepared.data_coord);
                if self.laid_out.contains(&key) {
                    continue;
                }

                let mut placed = Vec::new();
                for rule in rules.iter().filter(|r| r.applies(source, zoom)) {
                    for feature in prepared.data.layer(&rule.layer) {
                        let Some(text) = feature.property_text(&rule.text_property) else {
                            continue;
                        };
                        let Some(local) = feature.geometry.anchor() else {
                            continue;
                        };
                        let anchor = prepared.to_global(&local);
                        let (w, h) = measure.measure(&text, rule.font_size);
                        let bbox = BBox::around(anchor, w * units_per_pixel, h * units_per_pixel);

                        let collides = self
                            .placements
                            .iter()
                            .chain(placed.iter())
                            .any(|p: &LabelPlacement| p.bbox.intersects(&bbox));
                        if collides {
                            continue;
                        }

                        placed.push(LabelPlacement {
                            text,
                            anchor,
                            bbox,
                            source: source.clone(),
                            data_coord: prepared.data_coord,
                            feature_id: feature.id,
                            font_size: rule.font_size,
                            color: rule.color,
                        });
                    }
                }

                let data_extent = BBox::new(
                    prepared.origin.x,
                    prepared.origin.y,
                    prepared.origin.x + prepared.dim,
                    prepared.origin.y + prepared.dim,
                );
                for label in &placed {
                    for tile in tiles_overlapping(zoom, &label.bbox) {
                        let tile_box = tile.bbox(0.0);
                        let inside_source = tile_box.min_x >= data_extent.min_x
                            && tile_box.max_x <= data_extent.max_x
                            && tile_box.min_y >= data_extent.min_y
                            && tile_box.max_y <= data_extent.max_y;
                        if !inside_source && self.is_laid_out(&tile) {
                            invalidated.insert(tile);
                        }
                    }
                }

                Arc::make_mut(&mut self.placements).extend(placed);
                self.laid_out.insert(key);
                self.data_tiles.insert(prepared.data_coord);
            }
        }

        invalidated
    }

    fn is_laid_out(&self, display: &TileCoord) -> bool {
        self.data_tiles
            .iter()
            .any(|data| display.ancestor(data.zoom) == Some(*data))
    }
}

fn tiles_overlapping(zoom: u8, bbox: &BBox) -> Vec<TileCoord> {
    if zoom > MAX_ZOOM {
        return Vec::new();
    }
    let n = 1i64 << zoom;
    let min_x = ((bbox.min_x / TILE_UNITS).floor() as i64).max(0);
    let min_y = ((bbox.min_y / TILE_UNITS).floor() as i64).max(0);
    let max_x = ((bbox.max_x / TILE_UNITS).ceil() as i64 - 1).min(n - 1);
    let max_y = ((bbox.max_y / TILE_UNITS).ceil() as i64 - 1).min(n - 1);

    let mut tiles = Vec::new();
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            tiles.push(TileCoord::new(zoom, x as u32, y as u32));
        }
    }
    tiles
}

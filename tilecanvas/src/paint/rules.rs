//! Rule-driven painter built on tiny-skia.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::coord::{BBox, Point};
use crate::source::{Feature, Geometry, PickedFeature, PreparedSourceTile};

use super::{Color, PaintRequest, Painter, TextRun, TileCanvas};

/// Extra pick tolerance around stroked and point symbols, in 256-units.
const PICK_SLOP: f64 = 1.0;

/// How matching features are drawn. Sizes are in 256-units, which equal
/// CSS pixels for 256-pixel tiles.
///
/// `Fill` applies to polygons, `Line` to lines and polygon outlines, and
/// `Circle` to points. Other combinations draw nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbolizer {
    Fill { color: Color },
    Line { color: Color, width: f64 },
    Circle { color: Color, radius: f64 },
}

impl Symbolizer {
    /// Half-extent the symbol may reach beyond its geometry.
    fn reach(&self) -> f64 {
        match self {
            Symbolizer::Fill { .. } => 0.0,
            Symbolizer::Line { width, .. } => width / 2.0,
            Symbolizer::Circle { radius, .. } => *radius,
        }
    }

    fn draws(&self, geometry: &Geometry) -> bool {
        matches!(
            (self, geometry),
            (Symbolizer::Fill { .. }, Geometry::Polygon(_))
                | (Symbolizer::Line { .. }, Geometry::Lines(_) | Geometry::Polygon(_))
                | (Symbolizer::Circle { .. }, Geometry::Points(_))
        )
    }

    fn pick_tolerance(&self) -> f64 {
        match self {
            Symbolizer::Fill { .. } => 0.0,
            _ => self.reach() + PICK_SLOP,
        }
    }
}

/// Paints features of one layer with one symbolizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintRule {
    /// Restrict to one source. `None` matches every source.
    pub source: Option<String>,
    pub layer: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub symbolizer: Symbolizer,
}

impl PaintRule {
    pub fn new(layer: impl Into<String>, symbolizer: Symbolizer) -> Self {
        Self {
            source: None,
            layer: layer.into(),
            min_zoom: 0,
            max_zoom: u8::MAX,
            symbolizer,
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

    fn applies(&self, source: &str, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
            && self.source.as_deref().map_or(true, |s| s == source)
    }
}

/// Default [`Painter`]: applies [`PaintRule`]s in order, draws label text
/// runs on top, and hit-tests the pointer against every drawn feature.
#[derive(Debug, Clone)]
pub struct RulePainter {
    xray_color: Color,
}

impl Default for RulePainter {
    fn default() -> Self {
        Self {
            xray_color: Color::rgba(60, 60, 60, 200),
        }
    }
}

impl RulePainter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_xray_color(mut self, color: Color) -> Self {
        self.xray_color = color;
        self
    }
}

/// One feature ready to draw, with the transforms it needs.
struct Placed<'a> {
    source: &'a str,
    layer: &'a str,
    prepared: &'a PreparedSourceTile,
    feature: &'a Feature,
}

impl Placed<'_> {
    fn device_point(&self, request: &PaintRequest<'_>, local: &Point) -> Point {
        request.to_device(&self.prepared.to_global(local))
    }

    fn global_bbox(&self) -> BBox {
        let local = self.feature.geometry.bbox();
        let min = self.prepared.to_global(&Point::new(local.min_x, local.min_y));
        let max = self.prepared.to_global(&Point::new(local.max_x, local.max_y));
        BBox::new(min.x, min.y, max.x, max.y)
    }

    fn hit(&self, pointer_global: &Point, tolerance: f64) -> bool {
        let local = self.prepared.to_local(pointer_global);
        self.feature
            .geometry
            .hit(&local, tolerance / self.prepared.scale())
    }

    fn picked(&self) -> PickedFeature {
        PickedFeature {
            source: self.source.to_string(),
            layer: self.layer.to_string(),
            feature_id: self.feature.id,
            properties: self.feature.properties.clone(),
        }
    }
}

impl Painter for RulePainter {
    fn paint(
        &self,
        canvas: &mut TileCanvas,
        request: &PaintRequest<'_>,
        picked: &mut Vec<PickedFeature>,
    ) -> Duration {
        let start = Instant::now();
        let pointer = request.pointer.map(|p| request.to_global(&p));
        let mut seen = HashSet::new();

        let mut visit = |placed: &Placed<'_>, symbolizer: &Symbolizer, canvas: &mut TileCanvas| {
            if !symbolizer.draws(&placed.feature.geometry) {
                return;
            }
            if !placed
                .global_bbox()
                .buffered(symbolizer.reach())
                .intersects(&request.bbox)
            {
                return;
            }
            draw_feature(canvas.pixmap_mut(), request, placed, symbolizer);

            if let Some(pointer) = pointer {
                if placed.hit(&pointer, symbolizer.pick_tolerance())
                    && seen.insert((
                        placed.source.to_string(),
                        placed.layer.to_string(),
                        placed.feature.id,
                    ))
                {
                    picked.push(placed.picked());
                }
            }
        };

        if request.xray {
            let outline = Symbolizer::Line {
                color: self.xray_color,
                width: 1.0,
            };
            let point = Symbolizer::Circle {
                color: self.xray_color,
                radius: 2.0,
            };
            for (source, tiles) in request.tile_map {
                for prepared in tiles {
                    for (layer, features) in &prepared.data.layers {
                        for feature in features {
                            let placed = Placed {
                                source,
                                layer,
                                prepared,
                                feature,
                            };
                            let symbolizer = match feature.geometry {
                                Geometry::Points(_) => &point,
                                _ => &outline,
                            };
                            visit(&placed, symbolizer, canvas);
                        }
                    }
                }
            }
        } else {
            for rule in request.rules {
                for (source, tiles) in request.tile_map {
                    if !rule.applies(source, request.zoom) {
                        continue;
                    }
                    for prepared in tiles {
                        for feature in prepared.data.layer(&rule.layer) {
                            let placed = Placed {
                                source,
                                layer: &rule.layer,
                                prepared,
                                feature,
                            };
                            visit(&placed, &rule.symbolizer, canvas);
                        }
                    }
                }
            }
        }

        if let Some(labels) = request.labels {
            for label in labels.iter().filter(|l| l.bbox.intersects(&request.bbox)) {
                let top_left = request.to_device(&Point::new(label.bbox.min_x, label.bbox.min_y));
                let bottom_right =
                    request.to_device(&Point::new(label.bbox.max_x, label.bbox.max_y));
                canvas.push_text(TextRun {
                    text: label.text.clone(),
                    position: Point::new(top_left.x, bottom_right.y),
                    font_size: label.font_size * request.scale,
                    color: label.color,
                });
                if let Some(color) = request.debug_color {
                    stroke_rect(canvas.pixmap_mut(), top_left, bottom_right, color, 1.0);
                }
            }
        }

        start.elapsed()
    }
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

fn ring_path(points: impl Iterator<Item = Point>, close: bool) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for (i, p) in points.enumerate() {
        if i == 0 {
            pb.move_to(p.x as f32, p.y as f32);
        } else {
            pb.line_to(p.x as f32, p.y as f32);
        }
    }
    if close {
        pb.close();
    }
    pb.finish()
}

fn draw_feature(
    pixmap: &mut Pixmap,
    request: &PaintRequest<'_>,
    placed: &Placed<'_>,
    symbolizer: &Symbolizer,
) {
    let to_device = |p: &Point| placed.device_point(request, p);
    let identity = Transform::identity();

    match (symbolizer, &placed.feature.geometry) {
        (Symbolizer::Fill { color }, Geometry::Polygon(rings)) => {
            let mut pb = PathBuilder::new();
            for ring in rings {
                for (i, p) in ring.iter().map(to_device).enumerate() {
                    if i == 0 {
                        pb.move_to(p.x as f32, p.y as f32);
                    } else {
                        pb.line_to(p.x as f32, p.y as f32);
                    }
                }
                pb.close();
            }
            if let Some(path) = pb.finish() {
                pixmap.fill_path(&path, &solid(*color), FillRule::EvenOdd, identity, None);
            }
        }
        (Symbolizer::Line { color, width }, Geometry::Lines(parts))
        | (Symbolizer::Line { color, width }, Geometry::Polygon(parts)) => {
            let close = matches!(placed.feature.geometry, Geometry::Polygon(_));
            let stroke = Stroke {
                width: (*width * request.scale) as f32,
                ..Stroke::default()
            };
            for part in parts {
                if let Some(path) = ring_path(part.iter().map(to_device), close) {
                    pixmap.stroke_path(&path, &solid(*color), &stroke, identity, None);
                }
            }
        }
        (Symbolizer::Circle { color, radius }, Geometry::Points(points)) => {
            let r = (*radius * request.scale) as f32;
            for p in points.iter().map(to_device) {
                if let Some(path) = PathBuilder::from_circle(p.x as f32, p.y as f32, r) {
                    pixmap.fill_path(&path, &solid(*color), FillRule::Winding, identity, None);
                }
            }
        }
        _ => {}
    }
}

/// Outline the device-pixel rectangle `min..max`.
pub(super) fn stroke_rect(pixmap: &mut Pixmap, min: Point, max: Point, color: Color, width: f32) {
    let Some(rect) = Rect::from_ltrb(min.x as f32, min.y as f32, max.x as f32, max.y as f32) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let stroke = Stroke {
        width,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &solid(color), &stroke, Transform::identity(), None);
}

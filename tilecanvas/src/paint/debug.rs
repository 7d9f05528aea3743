//! Diagnostic overlay drawn on top of a painted tile.

use std::time::Duration;

use tiny_skia::{Paint, PathBuilder, Stroke, Transform};

use crate::coord::{BBox, Point, TileCoord};
use crate::source::PreparedTileMap;

use super::rules::stroke_rect;
use super::{Color, TextRun, TileCanvas};

/// Timings at or below this are not worth printing.
pub const DEBUG_NOISE_THRESHOLD: Duration = Duration::from_millis(8);

const LINE_HEIGHT: f64 = 14.0;
const FONT_SIZE: f64 = 12.0;
const MARGIN: f64 = 4.0;

/// What the overlay reports for one tile.
#[derive(Debug, Clone, Copy)]
pub struct DebugInfo<'a> {
    pub coord: TileCoord,
    /// Painted area in 256-unit global space.
    pub bbox: BBox,
    /// Tile origin in 256-unit global space.
    pub origin: Point,
    /// Device pixels per 256-unit.
    pub scale: f64,
    pub tile_map: &'a PreparedTileMap,
    /// Pointer in device pixels, if it is over this tile.
    pub pointer: Option<Point>,
    pub layout_time: Duration,
    pub paint_time: Duration,
    pub color: Color,
}

impl DebugInfo<'_> {
    fn to_device(&self, global: &Point) -> Point {
        global.sub(&self.origin).scale(self.scale)
    }

    /// Text lines in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.coord.to_string()];
        for (source, tiles) in self.tile_map {
            for tile in tiles {
                lines.push(format!(
                    "{} {} @ {:.0},{:.0}",
                    source, tile.data_coord, tile.origin.x, tile.origin.y
                ));
            }
        }
        if let Some(p) = self.pointer {
            lines.push(format!("pointer {:.1},{:.1}", p.x, p.y));
        }
        if self.layout_time > DEBUG_NOISE_THRESHOLD {
            lines.push(format!("layout {}ms", self.layout_time.as_millis()));
        }
        if self.paint_time > DEBUG_NOISE_THRESHOLD {
            lines.push(format!("paint {}ms", self.paint_time.as_millis()));
        }
        lines
    }
}

/// Draw tile diagnostics onto `canvas`.
pub fn draw_debug_overlay(canvas: &mut TileCanvas, info: &DebugInfo<'_>) {
    for (i, line) in info.lines().into_iter().enumerate() {
        canvas.push_text(TextRun {
            text: line,
            position: Point::new(MARGIN, MARGIN + LINE_HEIGHT * (i + 1) as f64),
            font_size: FONT_SIZE,
            color: info.color,
        });
    }

    let pixmap = canvas.pixmap_mut();

    let min = info.to_device(&Point::new(info.bbox.min_x, info.bbox.min_y));
    let max = info.to_device(&Point::new(info.bbox.max_x, info.bbox.max_y));
    stroke_rect(pixmap, min, max, info.color, 1.0);

    // Data tile boundaries, visible when a source is overzoomed.
    for tiles in info.tile_map.values() {
        for tile in tiles {
            let min = info.to_device(&tile.origin);
            let max = info.to_device(&Point::new(tile.origin.x + tile.dim, tile.origin.y + tile.dim));
            stroke_rect(pixmap, min, max, info.color, 1.0);
        }
    }

    let mut pb = PathBuilder::new();
    pb.move_to(0.0, pixmap.height() as f32);
    pb.line_to(0.0, 0.0);
    pb.line_to(pixmap.width() as f32, 0.0);
    if let Some(path) = pb.finish() {
        let mut paint = Paint::default();
        paint.set_color(info.color.to_skia());
        let stroke = Stroke {
            width: 0.5,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PreparedSourceTile, TileData};
    use std::sync::Arc;

    fn info<'a>(map: &'a PreparedTileMap, layout_ms: u64, paint_ms: u64) -> DebugInfo<'a> {
        let coord = TileCoord::new(4, 3, 5);
        DebugInfo {
            coord,
            bbox: coord.bbox(16.0),
            origin: coord.origin(),
            scale: 1.0,
            tile_map: map,
            pointer: None,
            layout_time: Duration::from_millis(layout_ms),
            paint_time: Duration::from_millis(paint_ms),
            color: Color::rgb(255, 0, 255),
        }
    }

    #[test]
    fn test_fast_timings_are_hidden() {
        let map = PreparedTileMap::new();
        let lines = info(&map, 3, 8).lines();
        assert_eq!(lines, vec!["4/3/5".to_string()]);
    }

    #[test]
    fn test_slow_timings_are_shown() {
        let map = PreparedTileMap::new();
        let lines = info(&map, 9, 20).lines();
        assert!(lines.contains(&"layout 9ms".to_string()));
        assert!(lines.contains(&"paint 20ms".to_string()));
    }

    #[test]
    fn test_lists_sources_and_pointer() {
        let coord = TileCoord::new(4, 3, 5);
        let data_coord = coord.ancestor(2).unwrap();
        let mut map = PreparedTileMap::new();
        map.insert(
            "roads".into(),
            vec![PreparedSourceTile::for_request(&coord, data_coord, Arc::new(TileData::default()))],
        );
        let mut debug = info(&map, 0, 0);
        debug.pointer = Some(Point::new(10.0, 20.5));

        let lines = debug.lines();
        assert_eq!(lines[1], "roads 2/0/1 @ 0,1024");
        assert_eq!(lines[2], "pointer 10.0,20.5");
    }

    #[test]
    fn test_overlay_draws_border_and_text() {
        let map = PreparedTileMap::new();
        let mut canvas = TileCanvas::new(256, 256).unwrap();
        draw_debug_overlay(&mut canvas, &info(&map, 0, 0));

        assert!(!canvas.is_blank());
        assert_eq!(canvas.texts().len(), 1);
        assert_eq!(canvas.texts()[0].text, "4/3/5");
    }
}

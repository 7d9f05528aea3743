//! Painting contract and the bundled tiny-skia painter.
//!
//! A [`Painter`] draws one tile's prepared source data and label placements
//! onto a [`TileCanvas`]. Geometry arrives in each source tile's local
//! units; the [`PaintRequest`] carries what is needed to map it into the
//! canvas: the requested tile's origin in 256-unit global space and the
//! device-pixel scale.

mod canvas;
mod debug;
mod rules;

pub use canvas::{TileCanvas, TextRun};
pub use debug::{draw_debug_overlay, DebugInfo, DEBUG_NOISE_THRESHOLD};
pub use rules::{PaintRule, RulePainter, Symbolizer};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::coord::{BBox, Point};
use crate::labels::LabelPlacement;
use crate::source::{PickedFeature, PreparedTileMap};

/// 8-bit straight-alpha color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_skia(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

/// Error returned when a color string is not `#rgb`, `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid color: {0}")]
pub struct ColorParseError(pub String);

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        match hex.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&hex[i..i + 1], 16)
                        .map(|v| v * 17)
                        .map_err(|_| err())
                };
                Ok(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Everything a painter needs for one tile.
#[derive(Debug, Clone, Copy)]
pub struct PaintRequest<'a> {
    pub zoom: u8,
    pub tile_map: &'a PreparedTileMap,
    /// `None` suppresses label drawing.
    pub labels: Option<&'a [LabelPlacement]>,
    pub rules: &'a [PaintRule],
    /// Area to draw, in 256-unit global space, including the paint buffer.
    pub bbox: BBox,
    /// Top-left of the requested tile in 256-unit global space.
    pub origin: Point,
    /// Device pixels per 256-unit.
    pub scale: f64,
    /// Draw raw geometry for every layer instead of applying rules.
    pub xray: bool,
    /// Outline label boxes in this color.
    pub debug_color: Option<Color>,
    /// Pointer position in the canvas, in device pixels.
    pub pointer: Option<Point>,
}

impl PaintRequest<'_> {
    /// Map a 256-unit global point to canvas device pixels.
    pub fn to_device(&self, global: &Point) -> Point {
        global.sub(&self.origin).scale(self.scale)
    }

    /// Map canvas device pixels to 256-unit global space.
    pub fn to_global(&self, device: &Point) -> Point {
        device.scale(1.0 / self.scale).add(&self.origin)
    }
}

/// Draws prepared tile data onto a canvas.
pub trait Painter: Send + Sync {
    /// Paint `request` onto `canvas`, appending any feature under the
    /// pointer to `picked`. Returns the time spent.
    fn paint(
        &self,
        canvas: &mut TileCanvas,
        request: &PaintRequest<'_>,
        picked: &mut Vec<PickedFeature>,
    ) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::rgb(255, 128, 0));
        assert_eq!("#f80".parse::<Color>().unwrap(), Color::rgb(255, 136, 0));
        assert_eq!(
            "#10203040".parse::<Color>().unwrap(),
            Color::rgba(16, 32, 48, 64)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("ff8000".parse::<Color>().is_err());
        assert!("#ff80".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["#0a0b0c", "#0a0b0c0d"] {
            assert_eq!(s.parse::<Color>().unwrap().to_string(), s);
        }
    }
}

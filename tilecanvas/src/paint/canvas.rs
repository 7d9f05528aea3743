//! Raster surface a tile is painted onto.

use image::RgbaImage;
use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::coord::Point;
use crate::render::RenderError;

use super::Color;

/// Text the host should draw over the raster (labels, debug annotations).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Baseline start in device pixels.
    pub position: Point,
    pub font_size: f64,
    pub color: Color,
}

/// Pixel buffer plus the text runs painted onto it.
#[derive(Clone)]
pub struct TileCanvas {
    pixmap: Pixmap,
    texts: Vec<TextRun>,
}

impl std::fmt::Debug for TileCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCanvas")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .field("texts", &self.texts.len())
            .finish()
    }
}

impl TileCanvas {
    /// Allocate a transparent canvas.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SurfaceUnavailable`] for zero or oversized
    /// dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let pixmap =
            Pixmap::new(width, height).ok_or(RenderError::SurfaceUnavailable { width, height })?;
        Ok(Self {
            pixmap,
            texts: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn fill(&mut self, color: Color) {
        self.pixmap.fill(color.to_skia());
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }

    pub fn texts(&self) -> &[TextRun] {
        &self.texts
    }

    pub fn push_text(&mut self, run: TextRun) {
        self.texts.push(run);
    }

    /// Straight-alpha color at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Color::rgba(c.red(), c.green(), c.blue(), c.alpha()))
    }

    /// True when every pixel is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.pixmap
            .pixels()
            .iter()
            .all(|p: &PremultipliedColorU8| p.alpha() == 0)
    }

    /// Copy the raster into an `image` buffer (straight alpha).
    pub fn to_image(&self) -> RgbaImage {
        let (width, height) = (self.width(), self.height());
        let mut out = RgbaImage::new(width, height);
        for (dst, src) in out.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            *dst = image::Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }
}

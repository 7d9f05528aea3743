//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use tilecanvas::config::LayerConfig;
use tilecanvas::coord::TileCoord;
use tilecanvas::labels::LabelRule;
use tilecanvas::paint::{Color, PaintRule, Symbolizer};

use crate::error::CliError;

/// Colors assigned to layers in order of name.
const PALETTE: [Color; 6] = [
    Color::rgb(0x4e, 0x79, 0xa7),
    Color::rgb(0x59, 0xa1, 0x4f),
    Color::rgb(0xe1, 0x57, 0x59),
    Color::rgb(0xf2, 0x8e, 0x2b),
    Color::rgb(0x76, 0xb7, 0xb2),
    Color::rgb(0xb0, 0x7a, 0xa1),
];

/// Overlay color used by `--debug` when the config sets none.
pub const DEFAULT_DEBUG_COLOR: Color = Color::rgb(0xff, 0x00, 0xff);

/// Parse a `#rgb`, `#rrggbb` or `#rrggbbaa` color argument.
pub fn parse_color(s: &str) -> Result<Color, String> {
    s.parse().map_err(|e| format!("{}", e))
}

/// Load the layer config: explicit path, else the default location, else defaults.
pub fn load_config(path: Option<&Path>) -> Result<LayerConfig, CliError> {
    match path {
        Some(path) => Ok(LayerConfig::load(path)?),
        None => Ok(LayerConfig::load_default()?),
    }
}

/// Style every layer with a fill, an outline, and point markers in one
/// palette color, and label features carrying `label_property`.
pub fn default_style<'a>(
    layers: impl IntoIterator<Item = &'a str>,
    label_property: Option<&str>,
) -> (Vec<PaintRule>, Vec<LabelRule>) {
    let mut paint_rules = Vec::new();
    let mut label_rules = Vec::new();

    for (i, layer) in layers.into_iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let translucent = Color::rgba(color.r, color.g, color.b, 0x80);
        paint_rules.push(PaintRule::new(layer, Symbolizer::Fill { color: translucent }));
        paint_rules.push(PaintRule::new(layer, Symbolizer::Line { color, width: 1.5 }));
        paint_rules.push(PaintRule::new(layer, Symbolizer::Circle { color, radius: 3.0 }));

        if let Some(property) = label_property {
            label_rules.push(LabelRule::new(layer, property).with_color(Color::BLACK));
        }
    }

    (paint_rules, label_rules)
}

/// `<dir>/<z>/<x>/<y>.png`
pub fn tile_output_path(dir: &Path, coord: &TileCoord) -> PathBuf {
    dir.join(coord.zoom.to_string())
        .join(coord.x.to_string())
        .join(format!("{}.png", coord.y))
}

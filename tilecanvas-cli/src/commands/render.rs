//! Render command - render the tiles covering a viewport to PNG files.
//!
//! Label text is laid out and counted but not rasterized; PNGs contain
//! geometry only.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use tilecanvas::coord::{LatLng, TileCoord, MAX_LAT, MAX_ZOOM};
use tilecanvas::layer::{TileEvent, TileLayer};
use tilecanvas::paint::{Color, RulePainter, TileCanvas};
use tilecanvas::source::MemorySource;
use tilecanvas::viewport::{StaticViewport, Viewport};
use tilecanvas::TileElement;

use super::common::{default_style, load_config, parse_color, tile_output_path, DEFAULT_DEBUG_COLOR};
use crate::error::CliError;

/// How long to wait for any single tile before giving up.
const TILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Arguments for the render command.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// JSON feature file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory; tiles are written as <z>/<x>/<y>.png
    #[arg(short, long, default_value = "tiles")]
    pub output: PathBuf,

    /// Viewport center latitude
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub lat: f64,

    /// Viewport center longitude
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub lng: f64,

    /// Zoom level to render
    #[arg(short, long, default_value_t = 2)]
    pub zoom: u8,

    /// Viewport width in CSS pixels
    #[arg(long, default_value_t = 768.0)]
    pub width: f64,

    /// Viewport height in CSS pixels
    #[arg(long, default_value_t = 768.0)]
    pub height: f64,

    /// Deepest zoom the input is sliced at; deeper tiles are overzoomed
    #[arg(long, default_value_t = 14)]
    pub max_data_zoom: u8,

    /// Feature property used for labels
    #[arg(long, default_value = "name")]
    pub label_property: String,

    /// Layer configuration file (INI)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Draw the debug overlay
    #[arg(long)]
    pub debug: bool,

    /// Override the debug overlay color
    #[arg(long, value_parser = parse_color)]
    pub debug_color: Option<Color>,

    /// Draw raw geometry and suppress labels
    #[arg(long)]
    pub xray: bool,

    /// Outline color for xray mode; implies --xray
    #[arg(long, value_parser = parse_color)]
    pub xray_color: Option<Color>,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> Result<(), CliError> {
    if args.zoom > MAX_ZOOM {
        return Err(CliError::Argument(format!(
            "zoom {} exceeds the maximum of {}",
            args.zoom, MAX_ZOOM
        )));
    }
    if args.lat.abs() > MAX_LAT {
        return Err(CliError::Argument(format!(
            "latitude {} is outside ±{}",
            args.lat, MAX_LAT
        )));
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(color) = args.debug_color {
        config = config.with_debug_color(color);
    } else if args.debug && config.debug_color.is_none() {
        config = config.with_debug_color(DEFAULT_DEBUG_COLOR);
    }
    if args.xray || args.xray_color.is_some() {
        config = config.with_xray(true);
    }

    let json = std::fs::read_to_string(&args.input).map_err(|e| CliError::input(&args.input, e))?;
    let source = MemorySource::from_json("input", args.max_data_zoom, &json)
        .map_err(|e| CliError::input(&args.input, e))?;
    let (paint_rules, label_rules) =
        default_style(source.layer_names(), Some(args.label_property.as_str()));

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::RuntimeCreation(e.to_string()))?;

    let start = Instant::now();
    let rendered = runtime.block_on(async {
        let viewport = Arc::new(StaticViewport::new(
            LatLng::new(args.lat, args.lng),
            args.zoom,
            (args.width, args.height),
            config.tile_size,
        ));
        let tiles = viewport.tile_range(args.zoom).tiles(args.zoom);
        if tiles.is_empty() {
            return Err(CliError::Argument("viewport covers no tiles".to_string()));
        }
        tracing::info!(
            zoom = args.zoom,
            tiles = tiles.len(),
            input = %args.input.display(),
            "Rendering viewport"
        );

        let mut painter = RulePainter::new();
        if let Some(color) = args.xray_color {
            painter = painter.with_xray_color(color);
        }

        let (layer, mut events) = TileLayer::builder(viewport)
            .config(config.clone())
            .painter(Arc::new(painter))
            .source("input", Arc::new(source))
            .paint_rules(paint_rules)
            .label_rules(label_rules)
            .build();

        let elements: Vec<(TileCoord, TileElement)> = tiles
            .iter()
            .map(|coord| (*coord, layer.create_tile(*coord).1))
            .collect();

        let progress = ProgressBar::new(elements.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} tiles {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut ready = 0;
        while ready < elements.len() {
            match tokio::time::timeout(TILE_TIMEOUT, events.recv()).await {
                Ok(Some(TileEvent::Ready { coord, .. })) => {
                    ready += 1;
                    progress.set_message(coord.to_string());
                    progress.inc(1);
                }
                Ok(None) => break,
                Err(_) => {
                    progress.abandon();
                    return Err(CliError::Render(format!(
                        "{} of {} tiles still pending after {:?}",
                        elements.len() - ready,
                        elements.len(),
                        TILE_TIMEOUT
                    )));
                }
            }
        }
        progress.finish_and_clear();

        let snapshot = layer.metrics();
        let labels = layer.coordinator().labels().get_index(args.zoom).len();
        layer.shutdown();
        Ok((elements, snapshot, labels))
    })?;

    let (elements, snapshot, labels) = rendered;
    let mut written = 0;
    for (coord, element) in &elements {
        let Some(canvas) = element.canvas() else {
            tracing::warn!(tile = %coord, "Tile has no canvas, skipping");
            continue;
        };
        let path = tile_output_path(&args.output, coord);
        write_tile(&canvas, &path)?;
        tracing::debug!(tile = %coord, path = %path.display(), "Tile written");
        written += 1;
    }

    println!(
        "{} {} tiles to {} in {:.1}s",
        style("Rendered").green().bold(),
        written,
        args.output.display(),
        start.elapsed().as_secs_f64()
    );
    println!("  {}", snapshot);
    println!("  {} labels placed", labels);
    Ok(())
}

/// Write `canvas` as a PNG, creating parent directories.
fn write_tile(canvas: &TileCanvas, path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CliError::output(parent, e))?;
    }
    canvas
        .to_image()
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| CliError::output(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tile_creates_png() {
        let dir = tempfile::tempdir().unwrap();
        let coord = TileCoord::new(3, 4, 2);
        let path = tile_output_path(dir.path(), &coord);
        let mut canvas = TileCanvas::new(16, 16).unwrap();
        canvas.fill(Color::rgb(200, 10, 10));

        write_tile(&canvas, &path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(decoded.get_pixel(3, 3).0, [200, 10, 10, 255]);
    }
}

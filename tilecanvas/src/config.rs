//! Layer configuration.
//!
//! [`LayerConfig`] collects the knobs a tile layer reads at construction:
//! tile size and device pixel ratio, the priority delay factor, paint
//! options, and pick timing. It can be built in code with the `with_*`
//! setters or loaded from the `[layer]` section of an INI file:
//!
//! ```ini
//! [layer]
//! tile_size = 512
//! device_pixel_ratio = 2
//! tile_delay = 5
//! background_color = #f8f4f0
//! xray = false
//! debug_color = #ff00ff
//! pick_window_ms = 1000
//! debug_brush_radius = 16
//! ```
//!
//! Unknown keys are ignored so files can be shared with other tools.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::paint::Color;

/// Section read by [`LayerConfig::from_ini`].
pub const LAYER_SECTION: &str = "layer";

/// Default tile width in CSS pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default time a pick cycle collects features before resolving.
pub const DEFAULT_PICK_WINDOW: Duration = Duration::from_millis(1000);

/// Default brush radius, in pixels, for debug feature queries.
pub const DEFAULT_DEBUG_BRUSH_RADIUS: f64 = 16.0;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Configuration for one tile layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    /// Tile width in CSS pixels.
    pub tile_size: u32,

    /// Device pixels per CSS pixel.
    pub device_pixel_ratio: f32,

    /// Milliseconds of render delay per tile of distance from the viewport
    /// center. `None` uses [`crate::priority::DEFAULT_TILE_DELAY`].
    pub tile_delay: Option<f64>,

    /// Canvas fill applied before painting.
    pub background_color: Option<Color>,

    /// Paint raw geometry and suppress labels.
    pub xray: bool,

    /// Enables the debug overlay in this color.
    pub debug_color: Option<Color>,

    /// How long a click collects picked features.
    pub pick_window: Duration,

    /// Brush radius for [`crate::layer::TileLayer::query_tile_features_debug`].
    pub debug_brush_radius: f64,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            device_pixel_ratio: 1.0,
            tile_delay: None,
            background_color: None,
            xray: false,
            debug_color: None,
            pick_window: DEFAULT_PICK_WINDOW,
            debug_brush_radius: DEFAULT_DEBUG_BRUSH_RADIUS,
        }
    }
}

impl LayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn with_tile_delay(mut self, delay: f64) -> Self {
        self.tile_delay = Some(delay);
        self
    }

    pub fn with_background_color(mut self, color: Color) -> Self {
        self.background_color = Some(color);
        self
    }

    pub fn with_xray(mut self, xray: bool) -> Self {
        self.xray = xray;
        self
    }

    pub fn with_debug_color(mut self, color: Color) -> Self {
        self.debug_color = Some(color);
        self
    }

    pub fn with_pick_window(mut self, window: Duration) -> Self {
        self.pick_window = window;
        self
    }

    pub fn with_debug_brush_radius(mut self, radius: f64) -> Self {
        self.debug_brush_radius = radius;
        self
    }

    /// Canvas width and height in device pixels.
    pub fn canvas_size(&self) -> u32 {
        (self.tile_size as f32 * self.device_pixel_ratio).round() as u32
    }

    /// Device pixels per 256-unit.
    pub fn device_scale(&self) -> f64 {
        self.tile_size as f64 * self.device_pixel_ratio as f64 / crate::coord::TILE_UNITS
    }

    /// Read the `[layer]` section of `ini`. Missing keys keep their defaults.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(LAYER_SECTION)) else {
            return Ok(config);
        };

        if let Some(v) = section.get("tile_size") {
            config.tile_size = parse_value("tile_size", v)?;
            if config.tile_size == 0 {
                return Err(invalid("tile_size", v));
            }
        }
        if let Some(v) = section.get("device_pixel_ratio") {
            config.device_pixel_ratio = parse_value("device_pixel_ratio", v)?;
            if !(config.device_pixel_ratio > 0.0) {
                return Err(invalid("device_pixel_ratio", v));
            }
        }
        if let Some(v) = section.get("tile_delay") {
            config.tile_delay = Some(parse_value("tile_delay", v)?);
        }
        if let Some(v) = section.get("background_color") {
            config.background_color = Some(parse_value("background_color", v)?);
        }
        if let Some(v) = section.get("xray") {
            config.xray = parse_bool("xray", v)?;
        }
        if let Some(v) = section.get("debug_color") {
            config.debug_color = Some(parse_value("debug_color", v)?);
        }
        if let Some(v) = section.get("pick_window_ms") {
            config.pick_window = Duration::from_millis(parse_value("pick_window_ms", v)?);
        }
        if let Some(v) = section.get("debug_brush_radius") {
            config.debug_brush_radius = parse_value("debug_brush_radius", v)?;
        }

        Ok(config)
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Load from an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Load from [`default_config_path`] if it exists, else defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// `~/.config/tilecanvas/config.ini` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tilecanvas").join("config.ini"))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: LAYER_SECTION.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LayerConfig::default();
        assert_eq!(config.tile_size, 256);
        assert_eq!(config.device_pixel_ratio, 1.0);
        assert_eq!(config.tile_delay, None);
        assert_eq!(config.pick_window, Duration::from_millis(1000));
        assert_eq!(config.canvas_size(), 256);
        assert_eq!(config.device_scale(), 1.0);
    }

    #[test]
    fn test_builder() {
        let config = LayerConfig::new()
            .with_tile_size(512)
            .with_device_pixel_ratio(2.0)
            .with_tile_delay(5.0)
            .with_xray(true);
        assert_eq!(config.canvas_size(), 1024);
        assert_eq!(config.device_scale(), 4.0);
        assert_eq!(config.tile_delay, Some(5.0));
        assert!(config.xray);
    }

    #[test]
    fn test_from_ini_str() {
        let config = LayerConfig::from_ini_str(
            "[layer]\n\
             tile_size = 512\n\
             tile_delay = 0\n\
             background_color = #102030\n\
             debug_color = #ff00ff80\n\
             xray = yes\n\
             pick_window_ms = 250\n\
             unrelated = whatever\n",
        )
        .unwrap();

        assert_eq!(config.tile_size, 512);
        assert_eq!(config.tile_delay, Some(0.0));
        assert_eq!(config.background_color, Some(Color::rgb(0x10, 0x20, 0x30)));
        assert_eq!(config.debug_color, Some(Color::rgba(255, 0, 255, 0x80)));
        assert!(config.xray);
        assert_eq!(config.pick_window, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = LayerConfig::from_ini_str("[other]\nkey = value\n").unwrap();
        assert_eq!(config, LayerConfig::default());
    }

    #[test]
    fn test_invalid_value() {
        let err = LayerConfig::from_ini_str("[layer]\ntile_size = huge\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, value } => {
                assert_eq!(section, "layer");
                assert_eq!(key, "tile_size");
                assert_eq!(value, "huge");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        assert!(LayerConfig::from_ini_str("[layer]\ntile_size = 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[layer]\ndevice_pixel_ratio = 2\n").unwrap();

        let config = LayerConfig::load(file.path()).unwrap();
        assert_eq!(config.device_pixel_ratio, 2.0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LayerConfig::load(&dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

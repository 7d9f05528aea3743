//! TileCanvas - vector tile compositing with staleness-aware rendering
//!
//! This library renders map tiles composed from one or more named vector
//! sources onto raster canvases. For each requested tile it fetches every
//! source concurrently, waits on auxiliary work such as font loads, lays out
//! labels across tile boundaries, delays painting by distance from the
//! viewport center, and paints. A tile that is removed, reused, or left
//! behind by a zoom change while any of this is pending never paints.
//!
//! # Modules
//!
//! - [`coord`] - tile coordinates, generation keys, Web Mercator helpers
//! - [`source`] - source trait, prepared tile data, in-memory source
//! - [`labels`] - label index and greedy collision layout
//! - [`priority`] - viewport-distance render delay
//! - [`pointer`] - click projection and the pick cycle
//! - [`paint`] - paint contract, tiny-skia painter, debug overlay
//! - [`render`] - the per-tile render coordinator
//! - [`layer`] - tile lifecycle, readiness and feature click events
//! - [`viewport`] - host viewport trait
//! - [`config`], [`telemetry`], [`logging`] - ambient services

pub mod config;
pub mod coord;
pub mod labels;
pub mod layer;
pub mod logging;
pub mod paint;
pub mod pointer;
pub mod priority;
pub mod render;
pub mod source;
pub mod telemetry;
pub mod viewport;

pub use config::LayerConfig;
pub use coord::{GenerationKey, LatLng, TileCoord};
pub use layer::{TileEvent, TileLayer};
pub use render::{RenderCoordinator, RenderOutcome, TileElement};

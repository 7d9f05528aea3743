//! Render coordination.
//!
//! [`RenderCoordinator::render_tile`] drives one tile through the pipeline:
//!
//! ```text
//! record zoom ─► fetch sources ─► gate ─► auxiliary tasks ─► gate ─► label layout
//!      ─► gate ─► attached? ─► priority delay ─► gate ─► paint ─► debug overlay
//! ```
//!
//! Each gate compares the element's live [`GenerationKey`] and the layer's
//! last requested zoom against the values the render started with. A render
//! that fails a gate returns [`RenderOutcome::Stale`] without touching the
//! canvas. The final check runs under the element lock as the new canvas is
//! installed, so a tile removed mid-paint is never drawn.
//!
//! Nothing a single render does is allowed to escape as an error: source
//! failures drop that source, auxiliary task failures are ignored, and a
//! missing drawing surface ends that tile's render only.
//!
//! [`GenerationKey`]: crate::coord::GenerationKey

mod context;
mod coordinator;
mod element;

pub use context::{AuxiliaryTasks, RenderContext, TaskSettled};
pub use coordinator::{RenderCoordinator, PAINT_BUFFER};
pub use element::TileElement;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors creating a drawing surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("drawing surface unavailable ({width}x{height})")]
    SurfaceUnavailable { width: u32, height: u32 },
}

/// Pipeline stage at which a staleness gate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Fetch,
    Tasks,
    Layout,
    Delay,
    Paint,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Fetch => "fetch",
            RenderStage::Tasks => "tasks",
            RenderStage::Layout => "layout",
            RenderStage::Delay => "delay",
            RenderStage::Paint => "paint",
        };
        f.write_str(name)
    }
}

/// How a render attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The canvas was replaced.
    Painted { layout: Duration, paint: Duration },
    /// The request was superseded before it could paint.
    Stale(RenderStage),
    /// The layer is no longer attached to a map.
    Detached,
    /// No drawing surface could be created.
    SurfaceFailed,
    /// The tile's zoom is above [`MAX_ZOOM`](crate::coord::MAX_ZOOM).
    InvalidZoom(u8),
}

impl RenderOutcome {
    pub fn is_painted(&self) -> bool {
        matches!(self, RenderOutcome::Painted { .. })
    }
}

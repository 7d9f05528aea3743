//! Render telemetry.
//!
//! Lock-free counters recorded by the render coordinator and tile layer,
//! with point-in-time snapshots for display.
//!
//! ```text
//! render_tile ─────► RenderMetrics ─────► RenderSnapshot ─────► Views
//!                    (atomic counters)    (point-in-time copy)   (CLI, logs)
//! ```
//!
//! # Example
//!
//! ```
//! use tilecanvas::telemetry::RenderMetrics;
//!
//! let metrics = RenderMetrics::new();
//! metrics.render_started();
//! metrics.render_painted(std::time::Duration::from_millis(2), std::time::Duration::from_millis(5));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.renders_painted, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::RenderMetrics;
pub use snapshot::RenderSnapshot;

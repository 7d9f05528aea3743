use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::RenderSnapshot;

/// Counters for every render outcome and failure class.
///
/// Shared by `Arc` between the coordinator and the layer. All updates are
/// relaxed; snapshots are not a consistent cut across counters.
#[derive(Debug, Default)]
pub struct RenderMetrics {
    renders_started: AtomicU64,
    renders_painted: AtomicU64,
    renders_stale: AtomicU64,
    renders_detached: AtomicU64,
    source_failures: AtomicU64,
    fetches_superseded: AtomicU64,
    auxiliary_failures: AtomicU64,
    surface_failures: AtomicU64,
    label_invalidations: AtomicU64,
    layout_micros: AtomicU64,
    paint_micros: AtomicU64,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_started(&self) {
        self.renders_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed paint and the time its stages took.
    pub fn render_painted(&self, layout: Duration, paint: Duration) {
        self.renders_painted.fetch_add(1, Ordering::Relaxed);
        self.layout_micros
            .fetch_add(layout.as_micros() as u64, Ordering::Relaxed);
        self.paint_micros
            .fetch_add(paint.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn render_stale(&self) {
        self.renders_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_detached(&self) {
        self.renders_detached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn source_failed(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_superseded(&self) {
        self.fetches_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auxiliary_failed(&self) {
        self.auxiliary_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn surface_failed(&self) {
        self.surface_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `tiles` display tiles invalidated by label layout.
    pub fn labels_invalidated(&self, tiles: usize) {
        self.label_invalidations
            .fetch_add(tiles as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            renders_started: self.renders_started.load(Ordering::Relaxed),
            renders_painted: self.renders_painted.load(Ordering::Relaxed),
            renders_stale: self.renders_stale.load(Ordering::Relaxed),
            renders_detached: self.renders_detached.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            fetches_superseded: self.fetches_superseded.load(Ordering::Relaxed),
            auxiliary_failures: self.auxiliary_failures.load(Ordering::Relaxed),
            surface_failures: self.surface_failures.load(Ordering::Relaxed),
            label_invalidations: self.label_invalidations.load(Ordering::Relaxed),
            layout_time: Duration::from_micros(self.layout_micros.load(Ordering::Relaxed)),
            paint_time: Duration::from_micros(self.paint_micros.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_start_at_zero() {
        assert_eq!(RenderMetrics::new().snapshot(), RenderSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = RenderMetrics::new();
        metrics.render_started();
        metrics.render_started();
        metrics.render_painted(Duration::from_millis(1), Duration::from_millis(4));
        metrics.render_painted(Duration::from_millis(2), Duration::from_millis(6));
        metrics.render_stale();
        metrics.source_failed();
        metrics.fetch_superseded();
        metrics.labels_invalidated(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.renders_started, 2);
        assert_eq!(snapshot.renders_painted, 2);
        assert_eq!(snapshot.renders_stale, 1);
        assert_eq!(snapshot.source_failures, 1);
        assert_eq!(snapshot.fetches_superseded, 1);
        assert_eq!(snapshot.label_invalidations, 3);
        assert_eq!(snapshot.layout_time, Duration::from_millis(3));
        assert_eq!(snapshot.paint_time, Duration::from_millis(10));
    }
}

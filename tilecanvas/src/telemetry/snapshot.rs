use std::fmt;
use std::time::Duration;

/// Point-in-time copy of [`super::RenderMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSnapshot {
    pub renders_started: u64,
    pub renders_painted: u64,
    pub renders_stale: u64,
    pub renders_detached: u64,
    pub source_failures: u64,
    pub fetches_superseded: u64,
    pub auxiliary_failures: u64,
    pub surface_failures: u64,
    pub label_invalidations: u64,
    /// Cumulative label layout time across painted renders.
    pub layout_time: Duration,
    /// Cumulative paint time across painted renders.
    pub paint_time: Duration,
}

impl RenderSnapshot {
    /// Renders that ended without painting.
    pub fn renders_aborted(&self) -> u64 {
        self.renders_stale + self.renders_detached + self.surface_failures
    }

    /// Mean paint time per painted render.
    pub fn mean_paint_time(&self) -> Duration {
        if self.renders_painted == 0 {
            return Duration::ZERO;
        }
        self.paint_time / self.renders_painted as u32
    }
}

impl fmt::Display for RenderSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} painted / {} started ({} stale, {} detached), {} source failures, \
             mean paint {:.1}ms",
            self.renders_painted,
            self.renders_started,
            self.renders_stale,
            self.renders_detached,
            self.source_failures,
            self.mean_paint_time().as_secs_f64() * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_paint_time() {
        let snapshot = RenderSnapshot {
            renders_painted: 4,
            paint_time: Duration::from_millis(20),
            ..Default::default()
        };
        assert_eq!(snapshot.mean_paint_time(), Duration::from_millis(5));
        assert_eq!(RenderSnapshot::default().mean_paint_time(), Duration::ZERO);
    }

    #[test]
    fn test_aborted_sums_failure_classes() {
        let snapshot = RenderSnapshot {
            renders_stale: 2,
            renders_detached: 1,
            surface_failures: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.renders_aborted(), 4);
    }
}

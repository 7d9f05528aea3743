//! Viewport-distance render delay.
//!
//! Tiles near the center of the visible tile range paint first. Each tile's
//! render is held back by `distance * delay_factor` milliseconds, where the
//! distance is measured in tile-grid units from the range center. A render
//! that becomes stale while waiting is dropped by the next staleness gate,
//! so no queue bookkeeping is needed.

use std::time::Duration;

use crate::coord::{Point, TileCoord};

/// Milliseconds of delay per tile of distance when none is configured.
pub const DEFAULT_TILE_DELAY: f64 = 3.0;

/// Grid distance between a tile and the visible range center.
#[inline]
pub fn grid_distance(coord: &TileCoord, range_center: &Point) -> f64 {
    Point::new(coord.x as f64, coord.y as f64).distance_to(range_center)
}

/// Delay before painting `coord`.
///
/// `delay_factor` falls back to [`DEFAULT_TILE_DELAY`]. Negative or
/// non-finite factors yield no delay.
pub fn render_delay(coord: &TileCoord, range_center: &Point, delay_factor: Option<f64>) -> Duration {
    let factor = delay_factor.unwrap_or(DEFAULT_TILE_DELAY);
    let millis = grid_distance(coord, range_center) * factor;
    if millis.is_finite() && millis > 0.0 {
        Duration::from_micros((millis * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_center_tile_has_no_delay() {
        let coord = TileCoord::new(10, 100, 200);
        let delay = render_delay(&coord, &Point::new(100.0, 200.0), None);
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_default_factor_is_three_ms_per_tile() {
        let coord = TileCoord::new(10, 103, 204);
        let delay = render_delay(&coord, &Point::new(100.0, 200.0), None);
        assert_eq!(delay.as_millis(), 15);
    }

    #[test]
    fn test_configured_factor() {
        let coord = TileCoord::new(10, 102, 200);
        let delay = render_delay(&coord, &Point::new(100.0, 200.0), Some(10.0));
        assert_eq!(delay.as_millis(), 20);
    }

    #[test]
    fn test_negative_factor_clamps_to_zero() {
        let coord = TileCoord::new(10, 102, 200);
        assert_eq!(
            render_delay(&coord, &Point::new(100.0, 200.0), Some(-4.0)),
            Duration::ZERO
        );
    }

    proptest! {
        #[test]
        fn test_delay_monotonic_in_distance(
            dx in 0u32..500,
            extra in 0u32..500,
            factor in 0.0..50.0_f64
        ) {
            let center = Point::new(0.0, 0.0);
            let near = TileCoord::new(12, dx, 0);
            let far = TileCoord::new(12, dx + extra, 0);
            let d_near = render_delay(&near, &center, Some(factor));
            let d_far = render_delay(&far, &center, Some(factor));
            prop_assert!(d_near <= d_far);
        }
    }
}

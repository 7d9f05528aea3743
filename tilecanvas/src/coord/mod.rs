//! Coordinate conversion module
//!
//! Provides the tile, key and bounding-box types used throughout rendering,
//! plus spherical Web Mercator conversions between geographic coordinates
//! and the normalized world plane that tiles subdivide.

mod types;

pub use types::{
    BBox, CoordError, GenerationKey, LatLng, Point, TileCoord, TileRange, MAX_LAT, MAX_ZOOM,
    MIN_LAT, MIN_LON, MIN_ZOOM, TILE_UNITS,
};

use std::f64::consts::PI;

/// Equatorial earth radius used by spherical Web Mercator, in meters.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Projects a geographic position to spherical Web Mercator meters.
///
/// Latitude is clamped to the Mercator range so the poles stay finite.
#[inline]
pub fn project(position: LatLng) -> Point {
    let lat = position.lat.clamp(MIN_LAT, MAX_LAT);
    let sin = (lat * PI / 180.0).sin();
    Point::new(
        EARTH_RADIUS * position.lng * PI / 180.0,
        EARTH_RADIUS * ((1.0 + sin) / (1.0 - sin)).ln() / 2.0,
    )
}

/// Maps a geographic position onto the normalized `[0,1) x [0,1)` world plane.
///
/// The longitude axis wraps, so `lng = 180` lands on `x = 0`. `y` grows
/// southward.
#[inline]
pub fn to_normalized(position: LatLng) -> Point {
    // Wrap in degree space so both antimeridians land on x = 0.
    let x = (position.lng + 180.0).rem_euclid(360.0) / 360.0;
    let x = if x >= 1.0 { 0.0 } else { x };
    let meters = project(position);
    let circumference = 2.0 * PI * EARTH_RADIUS;
    let y = (0.5 - meters.y / circumference).clamp(0.0, 1.0 - f64::EPSILON);
    Point::new(x, y)
}

/// Inverse of [`to_normalized`] for points inside the world plane.
#[inline]
pub fn normalized_to_lat_lng(point: Point) -> LatLng {
    let lng = point.x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * point.y)).sinh().atan() * 180.0 / PI;
    LatLng::new(lat, lng)
}

/// Converts geographic coordinates to tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.0511287798 to 85.0511287798)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 24)
///
/// # Returns
///
/// A `Result` containing the tile coordinates or an error if inputs are invalid.
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let world = to_normalized(LatLng::new(lat, lon));

    Ok(TileCoord {
        zoom,
        x: (world.x * n) as u32,
        y: (world.y * n) as u32,
    })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = tile.grid_size() as f64;
    let position = normalized_to_lat_lng(Point::new(tile.x as f64 / n, tile.y as f64 / n));
    (position.lat, position.lng)
}

/// Geographic position of a tile's center.
#[inline]
pub fn tile_center(tile: &TileCoord) -> LatLng {
    let n = tile.grid_size() as f64;
    normalized_to_lat_lng(Point::new(
        (tile.x as f64 + 0.5) / n,
        (tile.y as f64 + 0.5) / n,
    ))
}

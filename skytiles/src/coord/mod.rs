//! Slippy-map coordinate conversions.
//!
//! Conversions between geographic coordinates (latitude/longitude) and the
//! Web Mercator tile grid used by raster map providers, plus the pixel-space
//! projection the region enumerator works in.

mod types;

pub use types::{CoordError, LatLonBounds, TileCoord, MAX_LAT, MAX_ZOOM, MIN_LAT, MIN_LON};

use std::f64::consts::PI;

/// Edge length of a raster tile in pixels.
pub const TILE_SIZE_PX: u32 = 256;

/// Earth circumference at the equator, in meters (WGS84).
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Projects geographic coordinates to Web Mercator pixel space.
///
/// Pixel space at zoom `z` is a square of `TILE_SIZE_PX * 2^z` pixels per
/// side; dividing by `TILE_SIZE_PX` yields fractional tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 19)
///
/// # Returns
///
/// The `(x, y)` pixel position, or an error if inputs are invalid.
pub fn project(lat: f64, lon: f64, zoom: u8) -> Result<(f64, f64), CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=180.0).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let scale = TILE_SIZE_PX as f64 * 2.0_f64.powi(zoom as i32);
    let lat_rad = lat * PI / 180.0;

    let x = (lon + 180.0) / 360.0 * scale;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * scale;

    Ok((x, y))
}

/// Converts geographic coordinates to the enclosing tile.
#[inline]
pub fn to_tile_coord(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    let (px, py) = project(lat, lon, zoom)?;
    let n = (1u64 << zoom) as i64;

    // Floor to tile indices; the right/bottom edge of the grid belongs to
    // the last tile.
    let x = ((px / TILE_SIZE_PX as f64).floor() as i64).clamp(0, n - 1) as u32;
    let y = ((py / TILE_SIZE_PX as f64).floor() as i64).clamp(0, n - 1) as u32;

    Ok(TileCoord { zoom, x, y })
}

/// Ground resolution at a latitude and zoom, in meters per pixel.
///
/// Standard spherical-mercator scale factor:
/// `circumference * cos(lat) / (tile_size * 2^zoom)`.
#[inline]
pub fn meters_per_pixel(lat: f64, zoom: u8) -> f64 {
    let lat_rad = lat * PI / 180.0;
    EARTH_CIRCUMFERENCE_M * lat_rad.cos() / (TILE_SIZE_PX as f64 * 2.0_f64.powi(zoom as i32))
}

/// Converts a tile back to the latitude/longitude of its northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;
    let y = tile.y as f64 / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan() * 180.0 / PI;

    (lat, lon)
}

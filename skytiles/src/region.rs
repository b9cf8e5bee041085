//! Region tile enumeration.
//!
//! Pure functions computing the tile set covering either a circular region
//! around a point (bulk pre-fetch) or the current viewport (live caching).
//! Both clamp to the valid grid range per axis; a region that exceeds the
//! globe at low zoom is truncated, never wrapped.

use std::collections::BTreeSet;

use tracing::debug;

use crate::coord::{self, CoordError, LatLonBounds, TileCoord, TILE_SIZE_PX};

/// Enumerate the tiles within `radius_km` of a center point, for each of
/// `zoom_levels`, deduplicated across zoom levels.
///
/// Per zoom level the center is projected to tile space, a tile radius is
/// derived from the ground resolution at that latitude (plus one tile of
/// safety margin), and the square bounding box of that radius is
/// enumerated. A zero or negative radius still yields the center tile.
///
/// # Arguments
///
/// * `lat` / `lon` - Center point in degrees
/// * `radius_km` - Radius in kilometers
/// * `zoom_levels` - Zoom levels to cover
///
/// # Returns
///
/// The deduplicated tile set, or an error for an invalid center or zoom.
pub fn tiles_in_radius(
    lat: f64,
    lon: f64,
    radius_km: f64,
    zoom_levels: &[u8],
) -> Result<Vec<TileCoord>, CoordError> {
    let radius_meters = (radius_km * 1000.0).max(0.0);
    let mut tiles = BTreeSet::new();

    for &zoom in zoom_levels {
        let (px, py) = coord::project(lat, lon, zoom)?;
        let center_x = px / TILE_SIZE_PX as f64;
        let center_y = py / TILE_SIZE_PX as f64;

        let meters_per_pixel = coord::meters_per_pixel(lat, zoom);
        let meters_per_tile = meters_per_pixel * TILE_SIZE_PX as f64;
        // One extra tile of margin so the circle never clips the box edge.
        let tile_radius = (radius_meters / meters_per_tile).ceil() as i64 + 1;

        let n = 1i64 << zoom;
        let min_x = (center_x - tile_radius as f64).floor() as i64;
        let max_x = (center_x + tile_radius as f64).ceil() as i64;
        let min_y = (center_y - tile_radius as f64).floor() as i64;
        let max_y = (center_y + tile_radius as f64).ceil() as i64;

        for x in min_x..=max_x {
            for y in min_y..=max_y {
                if x >= 0 && x < n && y >= 0 && y < n {
                    tiles.insert(TileCoord {
                        zoom,
                        x: x as u32,
                        y: y as u32,
                    });
                }
            }
        }
    }

    debug!(
        lat,
        lon,
        radius_km,
        tile_count = tiles.len(),
        "enumerated radius tile set"
    );

    Ok(tiles.into_iter().collect())
}

/// Enumerate the tiles covering a viewport at a single zoom level.
///
/// Projects the southwest and northeast corners to tile space and returns
/// the covering rectangle, clamped to the grid.
pub fn tiles_in_viewport(bounds: &LatLonBounds, zoom: u8) -> Result<Vec<TileCoord>, CoordError> {
    let (sw_x, sw_y) = coord::project(bounds.south, bounds.west, zoom)?;
    let (ne_x, ne_y) = coord::project(bounds.north, bounds.east, zoom)?;

    let n = 1i64 << zoom;
    let tile_size = TILE_SIZE_PX as f64;

    // North is the smaller pixel y, so the y range comes from NE to SW.
    let min_x = ((sw_x / tile_size).floor() as i64).clamp(0, n - 1);
    let max_x = ((ne_x / tile_size).floor() as i64).clamp(0, n - 1);
    let min_y = ((ne_y / tile_size).floor() as i64).clamp(0, n - 1);
    let max_y = ((sw_y / tile_size).floor() as i64).clamp(0, n - 1);

    let mut tiles = Vec::new();
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            tiles.push(TileCoord {
                zoom,
                x: x as u32,
                y: y as u32,
            });
        }
    }

    debug!(zoom, tile_count = tiles.len(), "enumerated viewport tile set");

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_includes_center_tile() {
        let tiles = tiles_in_radius(52.5, 13.4, 5.0, &[12]).unwrap();
        let center = coord::to_tile_coord(52.5, 13.4, 12).unwrap();
        assert!(tiles.contains(&center));
    }

    #[test]
    fn test_radius_spans_requested_zooms() {
        let tiles = tiles_in_radius(52.5, 13.4, 5.0, &[12, 13]).unwrap();
        assert!(!tiles.is_empty());
        assert!(tiles.iter().any(|t| t.zoom == 12));
        assert!(tiles.iter().any(|t| t.zoom == 13));
        assert!(tiles.iter().all(|t| t.zoom == 12 || t.zoom == 13));
    }

    #[test]
    fn test_radius_zero_yields_center_neighborhood() {
        // Zero radius still keeps the one-tile safety margin around the
        // center tile.
        let tiles = tiles_in_radius(52.5, 13.4, 0.0, &[12]).unwrap();
        let center = coord::to_tile_coord(52.5, 13.4, 12).unwrap();
        assert!(tiles.contains(&center));
    }

    #[test]
    fn test_radius_negative_treated_as_zero() {
        let tiles = tiles_in_radius(52.5, 13.4, -4.0, &[12]).unwrap();
        let center = coord::to_tile_coord(52.5, 13.4, 12).unwrap();
        assert!(tiles.contains(&center));
    }

    #[test]
    fn test_radius_clamps_at_low_zoom() {
        // 500 km at zoom 1 covers more than the 2x2 grid; enumeration must
        // clamp instead of wrapping.
        let tiles = tiles_in_radius(0.0, 0.0, 500.0, &[1]).unwrap();
        assert!(tiles.len() <= 4);
        assert!(tiles.iter().all(|t| t.x < 2 && t.y < 2));
    }

    #[test]
    fn test_radius_no_duplicates() {
        let tiles = tiles_in_radius(52.5, 13.4, 10.0, &[11, 12]).unwrap();
        let mut seen = std::collections::HashSet::new();
        for tile in &tiles {
            assert!(seen.insert(*tile), "duplicate tile {tile}");
        }
    }

    #[test]
    fn test_radius_coverage_contains_circle_box() {
        // The enumerated box must contain the requested circle's bounding
        // box in pixel space, including near-polar latitudes.
        for lat in [0.0, 52.5, 75.0, 84.0] {
            let zoom = 12;
            let radius_km = 8.0;
            let tiles = tiles_in_radius(lat, 10.0, radius_km, &[zoom]).unwrap();

            let (px, py) = coord::project(lat, 10.0, zoom).unwrap();
            let radius_px = radius_km * 1000.0 / coord::meters_per_pixel(lat, zoom);
            // The circle box is clamped to world pixel space, as the grid is.
            let scale = 256.0 * 2.0_f64.powi(zoom as i32);
            let want_min_x = (px - radius_px).max(0.0);
            let want_max_x = (px + radius_px).min(scale);
            let want_min_y = (py - radius_px).max(0.0);
            let want_max_y = (py + radius_px).min(scale);

            let min_x = tiles.iter().map(|t| t.x).min().unwrap() as f64 * 256.0;
            let max_x = (tiles.iter().map(|t| t.x).max().unwrap() + 1) as f64 * 256.0;
            let min_y = tiles.iter().map(|t| t.y).min().unwrap() as f64 * 256.0;
            let max_y = (tiles.iter().map(|t| t.y).max().unwrap() + 1) as f64 * 256.0;

            assert!(min_x <= want_min_x, "lat {lat}: west edge uncovered");
            assert!(max_x >= want_max_x, "lat {lat}: east edge uncovered");
            assert!(min_y <= want_min_y, "lat {lat}: north edge uncovered");
            assert!(max_y >= want_max_y, "lat {lat}: south edge uncovered");
        }
    }

    #[test]
    fn test_viewport_rectangle() {
        let bounds = LatLonBounds::new(52.4, 13.2, 52.6, 13.6);
        let tiles = tiles_in_viewport(&bounds, 12).unwrap();
        assert!(!tiles.is_empty());

        // Rectangle: count equals x-span times y-span.
        let xs: std::collections::HashSet<_> = tiles.iter().map(|t| t.x).collect();
        let ys: std::collections::HashSet<_> = tiles.iter().map(|t| t.y).collect();
        assert_eq!(tiles.len(), xs.len() * ys.len());
    }

    #[test]
    fn test_viewport_contains_corners() {
        let bounds = LatLonBounds::new(52.4, 13.2, 52.6, 13.6);
        let zoom = 12;
        let tiles = tiles_in_viewport(&bounds, zoom).unwrap();

        let sw = coord::to_tile_coord(bounds.south, bounds.west, zoom).unwrap();
        let ne = coord::to_tile_coord(bounds.north, bounds.east, zoom).unwrap();
        assert!(tiles.contains(&sw));
        assert!(tiles.contains(&ne));
    }

    #[test]
    fn test_viewport_clamps_at_low_zoom() {
        let bounds = LatLonBounds::new(-80.0, -179.0, 80.0, 179.0);
        let tiles = tiles_in_viewport(&bounds, 0).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0], TileCoord { zoom: 0, x: 0, y: 0 });
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_radius_tiles_in_bounds(
                lat in -84.0..84.0_f64,
                lon in -180.0..180.0_f64,
                radius_km in 0.0..25.0_f64,
                zoom in 1u8..=13
            ) {
                let tiles = tiles_in_radius(lat, lon, radius_km, &[zoom])?;
                let n = 1u32 << zoom;
                prop_assert!(!tiles.is_empty());
                for tile in tiles {
                    prop_assert!(tile.x < n);
                    prop_assert!(tile.y < n);
                    prop_assert_eq!(tile.zoom, zoom);
                }
            }

            #[test]
            fn test_viewport_tiles_in_bounds(
                south in -84.0..0.0_f64,
                west in -179.0..0.0_f64,
                lat_span in 0.01..10.0_f64,
                lon_span in 0.01..10.0_f64,
                zoom in 0u8..=14
            ) {
                let bounds = LatLonBounds::new(
                    south,
                    west,
                    (south + lat_span).min(84.0),
                    (west + lon_span).min(179.0),
                );
                let tiles = tiles_in_viewport(&bounds, zoom)?;
                let n = 1u32 << zoom;
                prop_assert!(!tiles.is_empty());
                for tile in tiles {
                    prop_assert!(tile.x < n);
                    prop_assert!(tile.y < n);
                }
            }
        }
    }
}

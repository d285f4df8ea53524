//! Utility functions for coordinate conversions and pixel-space helpers

use geo::Coord;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Precomputed constant: 1 / (4 * PI)
const INV_FOUR_PI: f64 = 1.0 / (4.0 * std::f64::consts::PI);

/// Convert WGS84 (lat, lon) to the normalized Web Mercator plane
///
/// # Arguments
/// * `lat` - Latitude in degrees, clamped to ±[`MAX_LATITUDE`]
/// * `lon` - Longitude in degrees (-180 to 180)
///
/// # Returns
/// A `Coord<f64>` in 0...1 on both axes; x grows eastwards, y grows southwards
/// (lon == 0 maps to x == 0.5, lat == 0 maps to y == 0.5)
#[inline(always)]
pub fn wgs84_to_normalized(lat: f64, lon: f64) -> Coord<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin_lat = lat.to_radians().sin();

    let x = (lon + 180.0) / 360.0;
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() * INV_FOUR_PI;

    Coord { x, y }
}

/// Convert a normalized Web Mercator coordinate back to WGS84
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline(always)]
pub fn normalized_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (std::f64::consts::FRAC_PI_2
        - 2.0 * ((y - 0.5) * 2.0 * std::f64::consts::PI).exp().atan())
    .to_degrees();
    (lat, lon)
}

/// Number of pixels spanned by the whole world at the given zoom level
#[inline(always)]
pub fn world_pixels(zoom_level: u8) -> f64 {
    crate::TILE_SIZE * (1u64 << zoom_level.min(30)) as f64
}

/// True when either axis of the difference exceeds `distance`
///
/// Cheaper than a euclidean comparison and strictly stronger: a point passing this
/// test is always at least `distance` away.
#[inline(always)]
pub fn abs_max_exceeds(dx: f32, dy: f32, distance: f32) -> bool {
    dx.abs() > distance || dy.abs() > distance
}

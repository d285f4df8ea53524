//! Plain value types shared by the pipeline stages

use geo::Coord;
use glam::Mat4;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::utils;

/// Fixed-point factor of [`GeoPoint`] coordinates (1e-6 degree units)
const MICRO_DEGREES: f64 = 1_000_000.0;

/// A geographic point in 1e-6 degree fixed point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeoPoint {
    pub latitude_e6: i32,
    pub longitude_e6: i32,
}

impl GeoPoint {
    /// Create a point from degrees, rounding to the nearest micro-degree
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude_e6: (latitude * MICRO_DEGREES).round() as i32,
            longitude_e6: (longitude * MICRO_DEGREES).round() as i32,
        }
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude_e6 as f64 / MICRO_DEGREES
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude_e6 as f64 / MICRO_DEGREES
    }

    /// Project into the normalized 0...1 Web Mercator plane
    #[inline]
    pub fn project(&self) -> Coord<f64> {
        utils::wgs84_to_normalized(self.latitude(), self.longitude())
    }
}

/// A 32-bit ARGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const BLACK: Color = Color(0xFF00_0000);

    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Opaque color from a 0xRRGGBB value
    pub const fn from_rgb(rgb: u32) -> Self {
        Self(0xFF00_0000 | (rgb & 0x00FF_FFFF))
    }

    /// Byte layout written into the vertex color stream
    #[inline]
    pub fn to_rgba_bytes(self) -> [u8; 4] {
        let [a, r, g, b] = self.0.to_be_bytes();
        [r, g, b, a]
    }
}

/// Map position in the normalized plane plus zoom information
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapPosition {
    /// Map center X in 0...1
    pub x: f64,
    /// Map center Y in 0...1
    pub y: f64,
    /// Integer zoom level
    pub zoom_level: u8,
    /// Linear scale; `2^zoom_level` for integer zooms, fractional while zooming
    pub scale: f64,
    /// Tilt in degrees, 0 = looking straight down
    pub tilt: f32,
    /// Bearing in degrees
    pub bearing: f32,
}

impl Default for MapPosition {
    fn default() -> Self {
        Self {
            x: 0.5,
            y: 0.5,
            zoom_level: 0,
            scale: 1.0,
            tilt: 0.0,
            bearing: 0.0,
        }
    }
}

impl MapPosition {
    /// Center the map on a geographic point at an integer zoom level
    pub fn from_geo(point: GeoPoint, zoom_level: u8) -> Self {
        let projected = point.project();
        Self {
            x: projected.x,
            y: projected.y,
            zoom_level,
            scale: (1u64 << zoom_level.min(30)) as f64,
            ..Default::default()
        }
    }

    /// `2^zoom_level`
    #[inline]
    pub fn zoom_scale(&self) -> u32 {
        1u32 << self.zoom_level.min(30)
    }

    /// Tile-quantized position used to decide whether the map moved enough to recompile
    #[inline]
    pub fn tile_key(&self) -> (i64, i64, u32) {
        let zoom_scale = self.zoom_scale();
        (
            (self.x * zoom_scale as f64).floor() as i64,
            (self.y * zoom_scale as f64).floor() as i64,
            zoom_scale,
        )
    }

    /// Copy of this position with the scale snapped to the integer zoom level
    pub fn snapped_to_zoom(&self) -> Self {
        Self {
            scale: self.zoom_scale() as f64,
            ..*self
        }
    }
}

/// What the render side knows about the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub position: MapPosition,
    pub view_proj: Mat4,
}

impl Viewport {
    pub fn new(position: MapPosition) -> Self {
        Self {
            position,
            view_proj: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_fixed_point() {
        let p = GeoPoint::from_degrees(47.123456, -122.654321);
        assert_eq!(p.latitude_e6, 47_123_456);
        assert_eq!(p.longitude_e6, -122_654_321);
        assert!((p.latitude() - 47.123456).abs() < 1e-9);
    }

    #[test]
    fn test_color_rgba_reorder() {
        let c = Color(0x80FF_2010);
        assert_eq!(c.to_rgba_bytes(), [0xFF, 0x20, 0x10, 0x80]);
        assert_eq!(Color::from_rgb(0xFF0000), Color(0xFFFF_0000));
    }

    #[test]
    fn test_tile_key() {
        let pos = MapPosition {
            x: 0.26,
            y: 0.74,
            zoom_level: 2,
            scale: 4.0,
            ..Default::default()
        };
        assert_eq!(pos.tile_key(), (1, 2, 4));
    }

    #[test]
    fn test_from_geo() {
        let pos = MapPosition::from_geo(GeoPoint::from_degrees(0.0, 0.0), 10);
        assert_eq!(pos.scale, 1024.0);
        assert!((pos.x - 0.5).abs() < 1e-12);
    }
}

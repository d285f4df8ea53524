//! Track style and compile configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::arrows::ArrowPart;
use crate::{COORD_SCALE, Color, MeshError, Result};

/// Line cap style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CapStyle {
    Butt,
    #[default]
    Round,
    Square,
}

/// Where vertex colors come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorMode {
    /// Every vertex uses [`TrackConfig::line_color`]
    Solid,
    /// Every vertex uses the color of its source point
    #[default]
    Gradient,
}

/// Shape of the direction arrows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArrowDesign {
    #[default]
    Wings,
    MiddleFin,
    OuterFins,
    WingsWithMiddleFin,
    WingsWithOuterFins,
}

impl ArrowDesign {
    /// Parts emitted per arrow, in drawing order
    ///
    /// Wings always come first so the fins are drawn on top of them.
    pub fn parts(self) -> SmallVec<[ArrowPart; 2]> {
        match self {
            ArrowDesign::Wings => smallvec![ArrowPart::Wings],
            ArrowDesign::MiddleFin => smallvec![ArrowPart::MiddleFin],
            ArrowDesign::OuterFins => smallvec![ArrowPart::OuterFins],
            ArrowDesign::WingsWithMiddleFin => smallvec![ArrowPart::Wings, ArrowPart::MiddleFin],
            ArrowDesign::WingsWithOuterFins => smallvec![ArrowPart::Wings, ArrowPart::OuterFins],
        }
    }

    /// Vertices emitted per arrow
    pub fn vertices_per_arrow(self) -> usize {
        self.parts().iter().map(|part| part.vertex_count()).sum()
    }
}

/// How a configuration change affects the compiled mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleChange {
    /// Nothing changed
    None,
    /// Only draw parameters changed; the painter bucket can be reused as is
    DrawOnly,
    /// Vertex geometry changed; a full recompile is needed
    Geometry,
}

/// Configuration of the track style and of the compile pass
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackConfig {
    /// Line width in pixels
    pub line_width: f32,
    /// Draw an outline pass below the line
    pub outline: bool,
    /// Additional outline width in pixels
    pub outline_width: f32,
    /// Outline brightness in -1...1 relative to the line color
    pub outline_brightness: f32,
    pub cap: CapStyle,
    pub color_mode: ColorMode,
    /// Color used by [`ColorMode::Solid`]
    pub line_color: Color,
    /// Minimum pixel distance between two accepted track points during compile
    pub min_point_distance: f32,
    /// Segments shorter than this (in pixels) are skipped by the tessellator
    pub min_segment_length: f32,
    /// Sideways displacement of bevel joins in pixels
    pub bevel_distance: f32,
    /// Half side of the square clip window in pixels
    pub clip_extent: f32,
    /// Generate direction arrows
    pub arrows: bool,
    /// Minimum pixel distance between two arrow samples
    pub arrow_min_distance: f32,
    /// Overall arrow scale, 10 = 1:1
    pub arrow_scale: f32,
    pub arrow_length: f32,
    pub arrow_length_center: f32,
    pub arrow_width: f32,
    pub arrow_height: f32,
    /// Z offset of the arrow base plane
    pub arrow_vertical_offset: i16,
    pub arrow_design: ArrowDesign,
    /// Minimum time between two compile passes in milliseconds
    pub compile_interval_ms: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            line_width: 4.0,
            outline: true,
            outline_width: 1.0,
            outline_brightness: -0.5,
            cap: CapStyle::default(),
            color_mode: ColorMode::default(),
            line_color: Color::from_rgb(0xFF0000),
            min_point_distance: 3.0,
            min_segment_length: 1.0 / 8.0,
            bevel_distance: 0.5,
            clip_extent: 2048.0,
            arrows: false,
            arrow_min_distance: 30.0,
            arrow_scale: 10.0,
            arrow_length: 20.0,
            arrow_length_center: 15.0,
            arrow_width: 20.0,
            arrow_height: 10.0,
            arrow_vertical_offset: 10,
            arrow_design: ArrowDesign::default(),
            compile_interval_ms: 50,
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("line_width", self.line_width),
            ("min_point_distance", self.min_point_distance),
            ("min_segment_length", self.min_segment_length),
            ("bevel_distance", self.bevel_distance),
            ("clip_extent", self.clip_extent),
            ("arrow_min_distance", self.arrow_min_distance),
            ("arrow_scale", self.arrow_scale),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(MeshError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("outline_width", self.outline_width),
            ("arrow_length", self.arrow_length),
            ("arrow_length_center", self.arrow_length_center),
            ("arrow_width", self.arrow_width),
            ("arrow_height", self.arrow_height),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(MeshError::InvalidConfig(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        if !(-1.0..=1.0).contains(&self.outline_brightness) {
            return Err(MeshError::InvalidConfig(format!(
                "outline_brightness must be in -1...1, got {}",
                self.outline_brightness
            )));
        }

        // Caps and bevels may extend a little past the window, keep one pixel of headroom
        let max_extent = i16::MAX as f32 / COORD_SCALE - 1.0;
        if self.clip_extent > max_extent {
            return Err(MeshError::InvalidConfig(format!(
                "clip_extent {} overflows 16-bit positions (max {max_extent})",
                self.clip_extent
            )));
        }

        Ok(())
    }

    /// Classify the difference to a previous configuration
    pub fn diff(&self, previous: &TrackConfig) -> StyleChange {
        let geometry_changed = self.cap != previous.cap
            || self.color_mode != previous.color_mode
            || (self.color_mode == ColorMode::Solid && self.line_color != previous.line_color)
            || self.min_point_distance != previous.min_point_distance
            || self.min_segment_length != previous.min_segment_length
            || self.bevel_distance != previous.bevel_distance
            || self.clip_extent != previous.clip_extent
            || self.arrows != previous.arrows
            || self.arrow_min_distance != previous.arrow_min_distance
            || self.arrow_scale != previous.arrow_scale
            || self.arrow_length != previous.arrow_length
            || self.arrow_length_center != previous.arrow_length_center
            || self.arrow_width != previous.arrow_width
            || self.arrow_height != previous.arrow_height
            || self.arrow_vertical_offset != previous.arrow_vertical_offset
            || self.arrow_design != previous.arrow_design;

        if geometry_changed {
            StyleChange::Geometry
        } else if self != previous {
            StyleChange::DrawOnly
        } else {
            StyleChange::None
        }
    }

    /// Color written for a source point
    #[inline]
    pub fn vertex_color(&self, point_color: Color) -> Color {
        match self.color_mode {
            ColorMode::Solid => self.line_color,
            ColorMode::Gradient => point_color,
        }
    }
}

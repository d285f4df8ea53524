//! Render-side contract
//!
//! GPU upload and drawing live outside this crate. This module holds what every
//! renderer of the compiled buffers needs: the [`UploadSink`] seam, the shader
//! path choice, the transform that sticks compile-time vertices to the current
//! map and the uniforms of the outline and core passes.

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::{COORD_SCALE, CapStyle, DIR_SCALE, MapPosition, TILE_SIZE, TrackBuffers, TrackConfig};

/// Receives finished buffers, typically by uploading them to GPU buffer objects
pub trait UploadSink {
    /// Take over a compiled snapshot; returns `false` when nothing could be uploaded
    fn upload(&mut self, buffers: &TrackBuffers) -> bool;

    /// Free everything uploaded so far
    fn release(&mut self);
}

/// Which line shader draws the strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderMode {
    /// Orthographic, cheaper; edges are faded in screen pixels
    Flat,
    /// Perspective corrected, used as soon as the map is tilted
    Projected,
}

impl ShaderMode {
    /// Flat below one degree of tilt
    #[inline]
    pub fn for_tilt(tilt: f32) -> Self {
        if tilt < 1.0 {
            ShaderMode::Flat
        } else {
            ShaderMode::Projected
        }
    }
}

/// Cap handling in the fragment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapMode {
    Thin,
    Butt,
    Round,
}

/// Translation and scale from compile-time vertex space to the current map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeTransform {
    /// Offset of the compile center from the current center, in current pixels
    pub translate_x: f32,
    pub translate_y: f32,
    /// Current scale over compile scale, divided by [`COORD_SCALE`]
    pub scale: f32,
    /// Current scale over compile scale
    pub vp_to_map_scale: f64,
}

impl RelativeTransform {
    pub fn new(compile: &MapPosition, current: &MapPosition) -> Self {
        let mut diff_x = compile.x - current.x;
        let diff_y = compile.y - current.y;

        // Take the short way around the dateline
        while diff_x < -0.5 {
            diff_x += 1.0;
        }
        while diff_x > 0.5 {
            diff_x -= 1.0;
        }

        let tile_scale = TILE_SIZE * current.scale;
        let vp_to_map_scale = current.scale / compile.scale;

        Self {
            translate_x: (diff_x * tile_scale) as f32,
            translate_y: (diff_y * tile_scale) as f32,
            scale: (vp_to_map_scale / COORD_SCALE as f64) as f32,
            vp_to_map_scale,
        }
    }

    /// Translate-scale model matrix of the compiled vertices
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(self.translate_x, self.translate_y, 0.0))
            * Mat4::from_scale(Vec3::new(self.scale, self.scale, 1.0))
    }

    /// `view_proj * self`, the matrix the line shader receives
    pub fn mvp(&self, view_proj: &Mat4) -> Mat4 {
        *view_proj * self.to_matrix()
    }
}

/// Uniforms of one strip draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineDrawParams {
    /// Extrusion multiplier, already divided by the extrusion scale
    pub width: f32,
    /// Multiplied with the vertex color; 1 leaves the color untouched
    pub outline_brightness: f32,
    pub cap_mode: CapMode,
    /// Width of the anti-aliased edge
    pub fade: f32,
}

impl LineDrawParams {
    /// Draw calls for one frame: the outline pass, if enabled, then the core pass
    pub fn passes(
        config: &TrackConfig,
        transform: &RelativeTransform,
        shader: ShaderMode,
    ) -> SmallVec<[LineDrawParams; 2]> {
        let scale = transform.vp_to_map_scale;
        let pixel = match shader {
            ShaderMode::Projected => 0.0001,
            ShaderMode::Flat => 1.5 / scale,
        };
        let cap_mode = if scale < 1.0 {
            CapMode::Thin
        } else if config.cap == CapStyle::Round {
            CapMode::Round
        } else {
            CapMode::Butt
        };

        // Fixed width: the extrusion is scaled back so the line keeps its pixel width
        let core_width = (config.line_width as f64).max(1.0) / scale;
        let pass = |width: f64, outline_brightness: f32| LineDrawParams {
            width: (width * (COORD_SCALE / DIR_SCALE) as f64) as f32,
            outline_brightness,
            cap_mode,
            fade: match shader {
                ShaderMode::Flat => (pixel / width) as f32,
                ShaderMode::Projected => pixel as f32,
            },
        };

        let mut passes = SmallVec::new();
        if config.outline {
            let width = core_width + config.outline_width as f64 / scale;
            passes.push(pass(width, config.outline_brightness + 1.0));
        }
        passes.push(pass(core_width, 1.0));
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(x: f64, y: f64, zoom_level: u8) -> MapPosition {
        MapPosition {
            x,
            y,
            zoom_level,
            scale: (1u32 << zoom_level) as f64,
            ..Default::default()
        }
    }

    #[test]
    fn test_shader_mode_for_tilt() {
        assert_eq!(ShaderMode::for_tilt(0.0), ShaderMode::Flat);
        assert_eq!(ShaderMode::for_tilt(0.99), ShaderMode::Flat);
        assert_eq!(ShaderMode::for_tilt(1.0), ShaderMode::Projected);
        assert_eq!(ShaderMode::for_tilt(45.0), ShaderMode::Projected);
    }

    #[test]
    fn test_transform_same_position() {
        let p = position(0.3, 0.4, 10);
        let transform = RelativeTransform::new(&p, &p);
        assert_eq!(transform.translate_x, 0.0);
        assert_eq!(transform.translate_y, 0.0);
        assert_eq!(transform.scale, 1.0 / 8.0);
        assert_eq!(transform.vp_to_map_scale, 1.0);
    }

    #[test]
    fn test_transform_wraps_dateline() {
        // Compiled just east of the dateline, now viewed just west of it
        let compile = position(0.001, 0.5, 2);
        let current = position(0.999, 0.5, 2);
        let transform = RelativeTransform::new(&compile, &current);
        let world = 256.0 * 4.0;
        assert!((transform.translate_x - 0.002 * world).abs() < 1e-3);

        let transform = RelativeTransform::new(&current, &compile);
        assert!((transform.translate_x + 0.002 * world).abs() < 1e-3);
    }

    #[test]
    fn test_transform_zoom_scale() {
        let compile = position(0.5, 0.5, 10);
        let mut current = compile;
        current.scale *= 1.5;
        let transform = RelativeTransform::new(&compile, &current);
        assert_eq!(transform.vp_to_map_scale, 1.5);
        assert_eq!(transform.scale, 1.5 / 8.0);
    }

    #[test]
    fn test_mvp_with_identity_view() {
        let compile = position(0.5, 0.5, 0);
        let current = position(0.25, 0.5, 0);
        let transform = RelativeTransform::new(&compile, &current);
        let mvp = transform.mvp(&Mat4::IDENTITY);
        assert_eq!(mvp, transform.to_matrix());
        // The compile center lands at (64, 0) current pixels
        assert_eq!(mvp.w_axis.x, 64.0);
        assert_eq!(mvp.w_axis.y, 0.0);
        assert_eq!(mvp.x_axis.x, 1.0 / 8.0);
    }

    #[test]
    fn test_mvp_applies_view_projection_last() {
        let transform = RelativeTransform {
            translate_x: 10.0,
            translate_y: 0.0,
            scale: 1.0,
            vp_to_map_scale: 8.0,
        };
        let double = Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));
        let mvp = transform.mvp(&double);
        // Translation is scaled by the view projection, not the other way around
        assert_eq!(mvp.w_axis.x, 20.0);
        assert_eq!(mvp.x_axis.x, 2.0);
    }

    #[test]
    fn test_outline_and_core_passes() {
        let config = TrackConfig::default();
        let p = position(0.5, 0.5, 10);
        let transform = RelativeTransform::new(&p, &p);
        let passes = LineDrawParams::passes(&config, &transform, ShaderMode::Flat);

        assert_eq!(passes.len(), 2);
        let (outline, core) = (passes[0], passes[1]);
        // Default width 4, outline 1
        assert_eq!(outline.width, 5.0 * 8.0 / 2048.0);
        assert_eq!(core.width, 4.0 * 8.0 / 2048.0);
        assert_eq!(outline.outline_brightness, 0.5);
        assert_eq!(core.outline_brightness, 1.0);
        assert_eq!(core.cap_mode, CapMode::Round);
        assert_eq!(core.fade, 1.5 / 4.0);
        assert_eq!(outline.fade, 1.5 / 5.0);
    }

    #[test]
    fn test_projected_pass_without_outline() {
        let config = TrackConfig {
            outline: false,
            cap: CapStyle::Butt,
            ..Default::default()
        };
        let p = position(0.5, 0.5, 10);
        let transform = RelativeTransform::new(&p, &p);
        let passes = LineDrawParams::passes(&config, &transform, ShaderMode::Projected);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].cap_mode, CapMode::Butt);
        assert_eq!(passes[0].fade, 0.0001);
    }

    #[test]
    fn test_zoomed_out_uses_thin_caps() {
        let compile = position(0.5, 0.5, 10);
        let mut current = compile;
        current.scale *= 0.5;
        let transform = RelativeTransform::new(&compile, &current);
        let passes = LineDrawParams::passes(&TrackConfig::default(), &transform, ShaderMode::Flat);
        assert!(passes.iter().all(|pass| pass.cap_mode == CapMode::Thin));
        // Width is scaled back up so the line keeps its pixel width
        assert_eq!(passes[1].width, 8.0 * 8.0 / 2048.0);
    }
}

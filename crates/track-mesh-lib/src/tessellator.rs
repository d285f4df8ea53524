//! Line tessellation into a packed triangle strip
//!
//! Every accepted polyline point becomes a pair of vertices sharing the point
//! position and carrying opposite extrusion vectors. The vertex shader pushes each
//! vertex along its extrusion vector by the runtime line width, so the width is not
//! part of the mesh.
//!
//! # Vertex layout
//!
//! `[x, y, dx, dy]` as `i16`: positions are scaled by [`COORD_SCALE`], extrusion
//! vectors by [`DIR_SCALE`]. The two low bits of `dx` and `dy` hold a 0/1/2
//! texture coordinate selector.
//!
//! # Vertex counts per polyline of N points
//!
//! - `2N` with butt/square caps (or round caps whose endpoints lie outside the cap window)
//! - `+2` per round cap whose endpoint lies inside the cap window
//! - `+2` per bevel join, `-2` per skipped short segment, `+2` for a closed polyline
//! - `+2` stitch vertices when appended to a non-empty strip

use geo::Coord;

use crate::vertex_data::{PackedVertex, VertexData};
use crate::{COORD_SCALE, CapStyle, Color, DIR_SCALE, TrackConfig};

/// Clears the two texture-coordinate bits of a packed extrusion component
const DIR_MASK: i32 = 0xFFFF_FFFC_u32 as i32;

/// Joins with a dot product (back vector . forward vector) above this get a bevel
const BEVEL_DOT: f32 = 0.65;

/// Above this the turn is almost 180 degrees and the bevel is set aside instead
const HAIRPIN_DOT: f32 = 0.999;

/// Miter cross term below which the plain perpendicular is used
const MITER_MIN_CROSS: f32 = 0.01;

/// Bevel side vector cross term below which the plain perpendicular is used
const BEVEL_MIN_CROSS: f32 = 0.1;

#[inline]
fn pack_position(v: f32) -> i16 {
    let scaled = v * COORD_SCALE;
    debug_assert!(
        scaled >= i16::MIN as f32 && scaled <= i16::MAX as f32,
        "position {v} overflows the packed vertex range"
    );
    scaled as i16
}

#[inline]
fn pack_extrusion(v: f32, tex: i32) -> i16 {
    (tex | ((v * DIR_SCALE) as i32 & DIR_MASK)) as i16
}

#[inline]
fn normalize_or(d: Coord<f32>, fallback: Coord<f32>) -> Coord<f32> {
    let length = (d.x * d.x + d.y * d.y).sqrt();
    if length > f32::EPSILON {
        d / length
    } else {
        fallback
    }
}

/// Writes one polyline into a shared strip, inserting the stitch vertices lazily
struct StripWriter<'a> {
    out: &'a mut VertexData,
    stitch: bool,
}

impl StripWriter<'_> {
    #[inline]
    fn push(&mut self, vertex: PackedVertex, rgba: [u8; 4]) {
        if self.stitch {
            self.stitch = false;
            // Degenerate triangles connecting the previous run to this one
            if let Some((last, last_rgba)) = self.out.last() {
                self.out.push_rgba(last, last_rgba);
            }
            self.out.push_rgba(vertex, rgba);
        }
        self.out.push_rgba(vertex, rgba);
    }

    /// Push the vertex pair of one polyline point
    #[inline]
    fn pair(&mut self, pos: Coord<f32>, extrusion: Coord<f32>, rgba: [u8; 4]) {
        let ox = pack_position(pos.x);
        let oy = pack_position(pos.y);
        self.push(
            [
                ox,
                oy,
                pack_extrusion(extrusion.x, 0),
                pack_extrusion(extrusion.y, 1),
            ],
            rgba,
        );
        self.push(
            [
                ox,
                oy,
                pack_extrusion(-extrusion.x, 2),
                pack_extrusion(-extrusion.y, 1),
            ],
            rgba,
        );
    }

    /// Push a vertex pair joining the segments around `pos`
    ///
    /// `back` points to the previous point, `forward` to the next one.
    #[inline]
    fn join(&mut self, pos: Coord<f32>, back: Coord<f32>, forward: Coord<f32>, rgba: [u8; 4]) {
        let sum = back + forward;
        let a = sum.y * forward.x - sum.x * forward.y;
        let extrusion = if a.abs() < MITER_MIN_CROSS {
            Coord {
                x: -forward.y,
                y: forward.x,
            }
        } else {
            sum / a
        };
        self.pair(pos, extrusion, rgba);
    }
}

/// Converts pixel-space polylines into packed strip vertices
#[derive(Debug, Clone)]
pub struct LineTessellator {
    cap: CapStyle,
    min_distance: f32,
    bevel_distance: f32,
    /// Round caps are only drawn for endpoints inside `-cap_extent...cap_extent`
    cap_extent: f32,
}

impl Default for LineTessellator {
    fn default() -> Self {
        Self::from_config(&TrackConfig::default())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LineTessellator {
    pub fn new(cap: CapStyle, min_distance: f32, bevel_distance: f32) -> Self {
        Self {
            cap,
            min_distance,
            bevel_distance,
            cap_extent: f32::MAX,
        }
    }

    pub fn from_config(config: &TrackConfig) -> Self {
        Self::new(config.cap, config.min_segment_length, config.bevel_distance)
            .with_cap_extent(config.clip_extent)
    }

    /// Limit round caps to endpoints inside `-extent...extent`
    pub fn with_cap_extent(mut self, extent: f32) -> Self {
        self.cap_extent = extent;
        self
    }

    #[inline]
    fn cap_inside(&self, p: Coord<f32>) -> bool {
        !(p.x < -self.cap_extent
            || p.x > self.cap_extent
            || p.y < -self.cap_extent
            || p.y > self.cap_extent)
    }

    /// Cap extension along the line for caps that are not drawn round
    #[inline]
    fn cap_shift(&self) -> f32 {
        match self.cap {
            CapStyle::Butt => 0.0,
            CapStyle::Square => 1.0,
            CapStyle::Round => 0.5,
        }
    }

    /// Append one polyline to `out`
    ///
    /// `colors` holds one color per point; missing entries repeat the last color.
    /// Returns the number of vertices accounted for this polyline, stitch
    /// vertices included, or 0 when the polyline is degenerate and skipped.
    pub fn tessellate(
        &self,
        points: &[Coord<f32>],
        colors: &[Color],
        closed: bool,
        out: &mut VertexData,
    ) -> usize {
        let (mut points, mut colors) = (points, colors);

        // Leading duplicates have no direction
        while points.len() > 2 && points[0] == points[1] {
            points = &points[1..];
            colors = colors.get(1..).unwrap_or(colors);
        }

        // Start and end point are equal
        if points.len() < 2 || (points.len() == 2 && points[0] == points[1]) {
            return 0;
        }

        // A simple 180 degree turn is drawn as its first segment
        if points.len() == 3 && points[0] == points[2] {
            points = &points[..2];
        }

        let rgba = |index: usize| -> [u8; 4] {
            colors
                .get(index)
                .or(colors.last())
                .copied()
                .unwrap_or(Color::WHITE)
                .to_rgba_bytes()
        };

        let n = points.len();
        let rounded = self.cap == CapStyle::Round;
        let stitch = !out.is_empty();
        let mut accounted = 2 * n + if closed { 2 } else { 0 } + if stitch { 2 } else { 0 };
        let mut writer = StripWriter { out, stitch };

        let mut cur = points[0];
        let mut cur_rgba = rgba(0);
        let first_dir = Coord { x: 1.0, y: 0.0 };
        let mut unit1 = normalize_or(points[1] - cur, first_dir);

        // Start cap
        let side = Coord {
            x: -unit1.y,
            y: unit1.x,
        };
        if rounded && self.cap_inside(cur) {
            accounted += 2;
            let ox = pack_position(cur.x);
            let oy = pack_position(cur.y);
            let outer = side - unit1;
            let inner = -(side + unit1);
            writer.push(
                [ox, oy, pack_extrusion(outer.x, 0), pack_extrusion(outer.y, 2)],
                cur_rgba,
            );
            writer.push(
                [ox, oy, pack_extrusion(inner.x, 2), pack_extrusion(inner.y, 2)],
                cur_rgba,
            );
            writer.pair(cur, side, cur_rgba);
        } else {
            let t = unit1 * self.cap_shift();
            let ox = pack_position(cur.x);
            let oy = pack_position(cur.y);
            let left = side - t;
            let right = -(side + t);
            writer.push(
                [ox, oy, pack_extrusion(left.x, 0), pack_extrusion(left.y, 1)],
                cur_rgba,
            );
            writer.push(
                [ox, oy, pack_extrusion(right.x, 2), pack_extrusion(right.y, 1)],
                cur_rgba,
            );
        }

        cur = points[1];
        cur_rgba = rgba(1);
        // Unit vector pointing back to the previous point
        unit1 = -unit1;

        let mut index = 2;
        loop {
            let (next, next_rgba) = if index < n {
                (points[index], rgba(index))
            } else if closed && index == n {
                // Close the loop back to the start point
                (points[0], rgba(0))
            } else {
                break;
            };
            index += 1;

            let d = next - cur;
            let distance = (d.x * d.x + d.y * d.y).sqrt();
            if distance < self.min_distance {
                accounted -= 2;
                continue;
            }
            let mut unit2 = d / distance;

            let dotp = unit2.x * unit1.x + unit2.y * unit1.y;
            if dotp > BEVEL_DOT {
                // Bevel join keeps the miter from going to infinity
                accounted += 2;

                let bevel_start;
                if dotp > HAIRPIN_DOT {
                    // Almost a full turn, set the join points aside
                    let sum = unit1 + unit2;
                    let a = unit2.x * sum.y - unit2.y * sum.x;
                    let aside = if a.abs() < BEVEL_MIN_CROSS {
                        Coord {
                            x: -unit2.y,
                            y: unit2.x,
                        }
                    } else {
                        sum / a
                    };
                    bevel_start = cur - aside * self.bevel_distance;
                    cur = cur + aside * self.bevel_distance;
                } else {
                    bevel_start = cur + unit1 * self.bevel_distance;
                    cur = cur + unit2 * self.bevel_distance;
                }

                let across = normalize_or(cur - bevel_start, unit2);
                writer.join(bevel_start, unit1, across, cur_rgba);

                unit1 = -across;
                unit2 = normalize_or(next - cur, unit2);
            }

            writer.join(cur, unit1, unit2, cur_rgba);

            cur = next;
            cur_rgba = next_rgba;
            unit1 = -unit2;
        }

        // End cap, unit1 points back along the last segment
        let side = Coord {
            x: unit1.y,
            y: -unit1.x,
        };
        let ox = pack_position(cur.x);
        let oy = pack_position(cur.y);
        if rounded && self.cap_inside(cur) {
            accounted += 2;
            writer.pair(cur, side, cur_rgba);
            let outer = side - unit1;
            let inner = -(side + unit1);
            writer.push(
                [ox, oy, pack_extrusion(outer.x, 0), pack_extrusion(outer.y, 0)],
                cur_rgba,
            );
            writer.push(
                [ox, oy, pack_extrusion(inner.x, 2), pack_extrusion(inner.y, 0)],
                cur_rgba,
            );
        } else {
            let t = unit1 * self.cap_shift();
            let left = side - t;
            let right = -(side + t);
            writer.push(
                [ox, oy, pack_extrusion(left.x, 0), pack_extrusion(left.y, 1)],
                cur_rgba,
            );
            writer.push(
                [ox, oy, pack_extrusion(right.x, 2), pack_extrusion(right.y, 1)],
                cur_rgba,
            );
        }

        accounted
    }
}

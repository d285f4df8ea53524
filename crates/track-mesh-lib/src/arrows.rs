//! Direction arrow geometry
//!
//! Arrows are sampled along the visible track and emitted as a plain triangle
//! list. Each vertex also carries a barycentric color coordinate so the fragment
//! stage can draw crisp edges without extra outline geometry.
//!
//! ```text
//!            left
//!              #---\
//!               -   ---\
//!   p1 #--------#---#-----# p2 (tip)
//!          on_line  back ---/
//!               -   ---/
//!              #---/
//!            right
//! ```

use geo::Coord;

use crate::{ArrowDesign, COORD_SCALE, TrackConfig};

/// Shorts per arrow vertex: x, y, z, part
pub const ARROW_SHORTS_PER_VERTEX: usize = 4;

/// Shorts per arrow color coordinate
pub const COLOR_COORDS_PER_VERTEX: usize = 3;

/// Value of the per-vertex part attribute for wings
const PART_WING: i16 = 0;

/// Value of the per-vertex part attribute for fins
const PART_FIN: i16 = 1;

/// One building block of an arrow design
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowPart {
    /// Two flat triangles forming the arrow head
    Wings,
    /// One vertical triangle along the line
    MiddleFin,
    /// Two vertical triangles below the wing tips
    OuterFins,
}

impl ArrowPart {
    pub fn vertex_count(self) -> usize {
        match self {
            ArrowPart::Wings => 6,
            ArrowPart::MiddleFin => 3,
            ArrowPart::OuterFins => 6,
        }
    }
}

/// Arrow triangle list plus its color coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrowVertices {
    /// x, y, z, part per vertex; x and y are scaled like line positions
    pub positions: Vec<i16>,
    /// Barycentric color coordinate per vertex
    pub color_coords: Vec<i16>,
}

impl ArrowVertices {
    /// Number of vertices
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len() / ARROW_SHORTS_PER_VERTEX
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.color_coords.clear();
    }

    #[inline]
    fn vertex(&mut self, x: i16, y: i16, z: i16, part: i16, coord: [i16; 3]) {
        self.positions.extend_from_slice(&[x, y, z, part]);
        self.color_coords.extend_from_slice(&coord);
    }
}

/// Scaled corner points of one arrow
struct ArrowPoints {
    tip: (i16, i16),
    left: (i16, i16),
    right: (i16, i16),
    back: (i16, i16),
    on_line: (i16, i16),
}

#[inline]
fn scaled(p: Coord<f64>) -> (i16, i16) {
    (
        (p.x * COORD_SCALE as f64) as i16,
        (p.y * COORD_SCALE as f64) as i16,
    )
}

/// Generates arrow heads between consecutive sample positions
#[derive(Debug, Clone)]
pub struct ArrowGenerator {
    length: f64,
    length_center: f64,
    half_width: f64,
    z: i16,
    fin_top_z: i16,
    fin_bottom_z: i16,
    design: ArrowDesign,
}

impl Default for ArrowGenerator {
    fn default() -> Self {
        Self::from_config(&TrackConfig::default())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ArrowGenerator {
    pub fn from_config(config: &TrackConfig) -> Self {
        let scale = config.arrow_scale / 10.0;
        // Sizes snap to whole pixels
        let length = (scale * config.arrow_length) as i32;
        let length_center = (scale * config.arrow_length_center) as i32;
        let width = (scale * config.arrow_width) as i32;
        let height = (scale * config.arrow_height) as i32;

        let z = config.arrow_vertical_offset;
        Self {
            length: length as f64,
            length_center: length_center as f64,
            half_width: (width / 2) as f64,
            z,
            fin_top_z: z.saturating_add(height as i16),
            fin_bottom_z: z.saturating_sub(height as i16),
            design: config.arrow_design,
        }
    }

    /// Append one arrow per consecutive pair of `samples` to `out`
    ///
    /// Each arrow points from the first sample of a pair towards the second. Pairs
    /// with coincident samples are skipped. Returns the number of arrows.
    pub fn generate(&self, samples: &[Coord<f32>], out: &mut ArrowVertices) -> usize {
        if samples.len() < 2 {
            return 0;
        }

        let parts = self.design.parts();
        let per_arrow = self.design.vertices_per_arrow();
        out.positions
            .reserve((samples.len() - 1) * per_arrow * ARROW_SHORTS_PER_VERTEX);
        out.color_coords
            .reserve((samples.len() - 1) * per_arrow * COLOR_COORDS_PER_VERTEX);

        let mut arrows = 0;
        for pair in samples.windows(2) {
            let Some(points) = self.arrow_points(pair[0], pair[1]) else {
                continue;
            };
            for part in &parts {
                match part {
                    ArrowPart::Wings => self.wings(&points, out),
                    ArrowPart::MiddleFin => self.middle_fin(&points, out),
                    ArrowPart::OuterFins => self.outer_fins(&points, out),
                }
            }
            arrows += 1;
        }
        arrows
    }

    fn arrow_points(&self, p1: Coord<f32>, p2: Coord<f32>) -> Option<ArrowPoints> {
        let p1 = Coord {
            x: p1.x as f64,
            y: p1.y as f64,
        };
        let p2 = Coord {
            x: p2.x as f64,
            y: p2.y as f64,
        };
        let diff = p2 - p1;
        let distance = (diff.x * diff.x + diff.y * diff.y).sqrt();
        if distance <= f64::EPSILON {
            return None;
        }
        let unit = diff / distance;
        let perpendicular = Coord {
            x: unit.y,
            y: -unit.x,
        };

        let on_line = p2 - unit * self.length.min(distance);
        let back = p2 - unit * self.length_center.min(distance);
        let fin = perpendicular * self.half_width;

        Some(ArrowPoints {
            tip: scaled(p2),
            left: scaled(on_line + fin),
            right: scaled(on_line - fin),
            back: scaled(back),
            on_line: scaled(on_line),
        })
    }

    fn wings(&self, p: &ArrowPoints, out: &mut ArrowVertices) {
        for side in [p.left, p.right] {
            out.vertex(p.tip.0, p.tip.1, self.z, PART_WING, [1, 0, 0]);
            out.vertex(p.back.0, p.back.1, self.z, PART_WING, [0, 1, 1]);
            out.vertex(side.0, side.1, self.z, PART_WING, [0, 0, 1]);
        }
    }

    fn middle_fin(&self, p: &ArrowPoints, out: &mut ArrowVertices) {
        out.vertex(p.tip.0, p.tip.1, self.z, PART_FIN, [1, 1, 0]);
        out.vertex(p.on_line.0, p.on_line.1, self.fin_top_z, PART_FIN, [0, 1, 0]);
        out.vertex(p.back.0, p.back.1, self.z, PART_FIN, [0, 0, 1]);
    }

    fn outer_fins(&self, p: &ArrowPoints, out: &mut ArrowVertices) {
        for side in [p.left, p.right] {
            out.vertex(p.tip.0, p.tip.1, self.z, PART_FIN, [1, 0, 0]);
            out.vertex(side.0, side.1, self.z, PART_FIN, [0, 1, 0]);
            out.vertex(side.0, side.1, self.fin_bottom_z, PART_FIN, [0, 0, 1]);
        }
    }
}

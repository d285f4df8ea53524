//! Streaming Cohen–Sutherland line clipper for the square pixel window

use geo::{Coord, Rect};

/// Cohen–Sutherland region code of a point relative to the clip window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcode(u8);

impl Outcode {
    pub const INSIDE: Outcode = Outcode(0);
    pub const LEFT: Outcode = Outcode(1);
    pub const RIGHT: Outcode = Outcode(2);
    pub const BOTTOM: Outcode = Outcode(4);
    pub const TOP: Outcode = Outcode(8);

    #[inline]
    pub fn is_inside(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn intersects(self, other: Outcode) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for Outcode {
    type Output = Outcode;

    fn bitor(self, rhs: Self) -> Self::Output {
        Outcode(self.0 | rhs.0)
    }
}

/// Classification of the segment between the previous and the current point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipResult {
    /// Both endpoints are inside the window
    Inside,
    /// The segment does not touch the window
    Outside,
    /// The segment crosses the window boundary; see [`LineClipper::line`]
    Intersection,
}

/// Clips a stream of points against an axis-aligned window
///
/// Feed the first point of a polyline with [`LineClipper::clip_start`] and every
/// following point with [`LineClipper::clip_next`]. The clipper remembers the
/// previous point and its region code.
#[derive(Debug, Clone)]
pub struct LineClipper {
    min: Coord<f32>,
    max: Coord<f32>,
    prev: Coord<f32>,
    prev_outcode: Outcode,
    line: [Coord<f32>; 2],
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LineClipper {
    pub fn new(window: Rect<f32>) -> Self {
        Self {
            min: window.min(),
            max: window.max(),
            prev: Coord::zero(),
            prev_outcode: Outcode::INSIDE,
            line: [Coord::zero(); 2],
        }
    }

    /// Square window `-extent...extent` on both axes
    pub fn square(extent: f32) -> Self {
        Self::new(Rect::new(
            Coord {
                x: -extent,
                y: -extent,
            },
            Coord {
                x: extent,
                y: extent,
            },
        ))
    }

    #[inline]
    pub fn outcode(&self, p: Coord<f32>) -> Outcode {
        let mut code = Outcode::INSIDE;
        if p.x < self.min.x {
            code = code | Outcode::LEFT;
        } else if p.x > self.max.x {
            code = code | Outcode::RIGHT;
        }
        if p.y < self.min.y {
            code = code | Outcode::BOTTOM;
        } else if p.y > self.max.y {
            code = code | Outcode::TOP;
        }
        code
    }

    /// Start a new polyline, returning the region code of its first point
    pub fn clip_start(&mut self, p: Coord<f32>) -> Outcode {
        self.prev = p;
        self.prev_outcode = self.outcode(p);
        self.prev_outcode
    }

    /// Classify the segment from the previous point to `p` and advance
    pub fn clip_next(&mut self, p: Coord<f32>) -> ClipResult {
        let outcode = self.outcode(p);

        let result = if (self.prev_outcode | outcode).is_inside() {
            ClipResult::Inside
        } else if self.prev_outcode.intersects(outcode) {
            ClipResult::Outside
        } else if self.clip(self.prev, p, self.prev_outcode, outcode) {
            ClipResult::Intersection
        } else {
            ClipResult::Outside
        };

        self.prev = p;
        self.prev_outcode = outcode;
        result
    }

    /// Region code of the most recently fed point
    #[inline]
    pub fn prev_outcode(&self) -> Outcode {
        self.prev_outcode
    }

    /// Clipped segment of the last [`ClipResult::Intersection`], in input direction
    #[inline]
    pub fn line(&self) -> [Coord<f32>; 2] {
        self.line
    }

    fn clip(
        &mut self,
        mut a: Coord<f32>,
        mut b: Coord<f32>,
        mut code_a: Outcode,
        mut code_b: Outcode,
    ) -> bool {
        loop {
            if (code_a | code_b).is_inside() {
                self.line = [a, b];
                return true;
            }
            if code_a.intersects(code_b) {
                return false;
            }

            // Move the endpoint that is outside onto the window edge
            let code_out = if code_a.is_inside() { code_b } else { code_a };
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            let edge = if code_out.intersects(Outcode::TOP) {
                Coord {
                    x: a.x + dx * (self.max.y - a.y) / dy,
                    y: self.max.y,
                }
            } else if code_out.intersects(Outcode::BOTTOM) {
                Coord {
                    x: a.x + dx * (self.min.y - a.y) / dy,
                    y: self.min.y,
                }
            } else if code_out.intersects(Outcode::RIGHT) {
                Coord {
                    x: self.max.x,
                    y: a.y + dy * (self.max.x - a.x) / dx,
                }
            } else {
                Coord {
                    x: self.min.x,
                    y: a.y + dy * (self.min.x - a.x) / dx,
                }
            };

            if code_out == code_a {
                a = edge;
                code_a = self.outcode(a);
            } else {
                b = edge;
                code_b = self.outcode(b);
            }
        }
    }
}

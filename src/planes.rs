//! Contains the PlaneMapper struct, which describes the relationship
//! between the square the attractor lives in and the integral plane
//! of the accumulation texture.
//!
//! Every trajectory point of the de Jong map is the difference of a
//! sine and a cosine, so both coordinates stay inside [-2, 2].  The
//! mapper scales that square down by a quarter, shrinks it by a 4%
//! margin and centres it, so the whole attractor lands inside the
//! texture with a thin border.

use num::clamp;

/// Fraction of the texture side the attractor's [-2, 2] square spans.
pub const MARGIN: f64 = 0.96;

/// Describes the x, y of a cell in the texture.  The origin is the
/// upper-left corner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub usize, pub usize);

/// Maps attractor coordinates onto a square texture of `size` cells
/// per side.
#[derive(Copy, Clone, Debug)]
pub struct PlaneMapper {
    size: usize,
    // Multiplier and offset shared by both axes.
    scale: f64,
    centre: f64,
    // Largest valid coordinate, as a float, used for clamping.
    limit: f64,
}

impl PlaneMapper {
    /// Constructor.  A zero-sized texture is accepted here but has no
    /// cells; callers validate the size before allocating.
    pub fn new(size: usize) -> PlaneMapper {
        let side = size as f64;
        PlaneMapper {
            size,
            scale: 0.25 * side * MARGIN,
            centre: side * 0.5,
            limit: (size.max(1) - 1) as f64,
        }
    }

    /// Cells per side.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The total number of cells in the texture.
    pub fn len(&self) -> usize {
        self.size * self.size
    }

    /// True when the texture has no cells at all.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Given a point on the attractor's plane, map it to the nearest
    /// cell at or below it.  Points that would fall off the texture
    /// (only possible with hand-edited shape parameters) are pinned to
    /// the border, and NaN lands on the first row or column.
    pub fn point_to_pixel(&self, x: f64, y: f64) -> Pixel {
        Pixel(self.axis(x), self.axis(y))
    }

    /// Index of the cell a point lands in, counted in cells from the
    /// start of the texture.
    pub fn point_to_offset(&self, x: f64, y: f64) -> usize {
        let Pixel(left, top) = self.point_to_pixel(x, y);
        top * self.size + left
    }

    #[inline]
    fn axis(&self, v: f64) -> usize {
        let mapped = v * self.scale + self.centre;
        // NaN fails every comparison inside clamp, the cast turns it into 0.
        clamp(mapped, 0.0, self.limit) as usize
    }
}

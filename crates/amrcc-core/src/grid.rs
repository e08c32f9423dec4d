// crates/amrcc-core/src/grid.rs

//! Inclusive integer boxes and dense scalar grids over them.
//!
//! The engine is compiled for three dimensions. Linear addressing is
//! x-fastest everywhere; the reader assigns vertex indices in the same
//! order, which keeps equal-value tie-breaking deterministic across runs.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid dimension.
pub const DIM: usize = 3;

/// Integer cell position.
pub type Point3 = [i32; DIM];

/// Add two positions component-wise.
#[inline]
#[must_use]
pub fn point_add(a: Point3, b: Point3) -> Point3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Scale a position from one refinement to another.
///
/// Refinements in a hierarchy divide one another, so the map is exact:
/// refining multiplies, coarsening floor-divides (Euclidean, so negative
/// ghost coordinates coarsen toward the containing cell).
#[inline]
#[must_use]
pub fn scale_point(p: Point3, from_refinement: i32, to_refinement: i32) -> Point3 {
    if to_refinement >= from_refinement {
        let ratio = to_refinement / from_refinement;
        [p[0] * ratio, p[1] * ratio, p[2] * ratio]
    } else {
        let ratio = from_refinement / to_refinement;
        [
            p[0].div_euclid(ratio),
            p[1].div_euclid(ratio),
            p[2].div_euclid(ratio),
        ]
    }
}

/// Inclusive axis-aligned box `[min, max]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bounds {
    /// Inclusive lower corner.
    pub min: Point3,
    /// Inclusive upper corner.
    pub max: Point3,
}

impl Bounds {
    /// Construct a box from inclusive corners.
    #[inline]
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Extent along each axis (`max - min + 1`).
    #[inline]
    #[must_use]
    pub fn shape(&self) -> Point3 {
        [
            self.max[0] - self.min[0] + 1,
            self.max[1] - self.min[1] + 1,
            self.max[2] - self.min[2] + 1,
        ]
    }

    /// Number of cells in the box (0 if inverted).
    #[inline]
    #[must_use]
    pub fn size(&self) -> i64 {
        let s = self.shape();
        if s.iter().any(|&d| d <= 0) {
            0
        } else {
            i64::from(s[0]) * i64::from(s[1]) * i64::from(s[2])
        }
    }

    /// Whether `p` lies inside the box.
    #[inline]
    #[must_use]
    pub fn contains(&self, p: Point3) -> bool {
        (0..DIM).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }

    /// Whether the two boxes overlap in at least one cell.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        (0..DIM).all(|a| self.min[a] <= other.max[a] && other.min[a] <= self.max[a])
    }

    /// The box grown by `ghost` cells on every side.
    #[inline]
    #[must_use]
    pub fn grown(&self, ghost: i32) -> Self {
        Self {
            min: [self.min[0] - ghost, self.min[1] - ghost, self.min[2] - ghost],
            max: [self.max[0] + ghost, self.max[1] + ghost, self.max[2] + ghost],
        }
    }

    /// The box clipped to `domain`.
    #[inline]
    #[must_use]
    pub fn clipped_to(&self, domain: &Self) -> Self {
        Self {
            min: [
                self.min[0].max(domain.min[0]),
                self.min[1].max(domain.min[1]),
                self.min[2].max(domain.min[2]),
            ],
            max: [
                self.max[0].min(domain.max[0]),
                self.max[1].min(domain.max[1]),
                self.max[2].min(domain.max[2]),
            ],
        }
    }

    /// The image of the box under [`scale_point`] on both corners.
    #[inline]
    #[must_use]
    pub fn scaled(&self, from_refinement: i32, to_refinement: i32) -> Self {
        if to_refinement >= from_refinement {
            let ratio = to_refinement / from_refinement;
            Self {
                min: scale_point(self.min, from_refinement, to_refinement),
                max: [
                    self.max[0] * ratio + ratio - 1,
                    self.max[1] * ratio + ratio - 1,
                    self.max[2] * ratio + ratio - 1,
                ],
            }
        } else {
            Self {
                min: scale_point(self.min, from_refinement, to_refinement),
                max: scale_point(self.max, from_refinement, to_refinement),
            }
        }
    }

    /// Linear index of `p`, x-fastest; `None` if `p` is outside.
    #[inline]
    #[must_use]
    pub fn index_of(&self, p: Point3) -> Option<i64> {
        if !self.contains(p) {
            return None;
        }
        let s = self.shape();
        let dx = i64::from(p[0] - self.min[0]);
        let dy = i64::from(p[1] - self.min[1]);
        let dz = i64::from(p[2] - self.min[2]);
        Some(dx + i64::from(s[0]) * (dy + i64::from(s[1]) * dz))
    }

    /// Position of linear index `idx` (inverse of [`Bounds::index_of`]).
    #[inline]
    #[must_use]
    pub fn position_of(&self, idx: i64) -> Point3 {
        let s = self.shape();
        let sx = i64::from(s[0]);
        let sy = i64::from(s[1]);
        let x = idx % sx;
        let y = (idx / sx) % sy;
        let z = idx / (sx * sy);
        [
            self.min[0] + x as i32,
            self.min[1] + y as i32,
            self.min[2] + z as i32,
        ]
    }

    /// Iterate all cells in the box, x-fastest.
    pub fn cells(&self) -> impl Iterator<Item = Point3> + '_ {
        let min = self.min;
        let max = self.max;
        (min[2]..=max[2]).flat_map(move |z| {
            (min[1]..=max[1]).flat_map(move |y| (min[0]..=max[0]).map(move |x| [x, y, z]))
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{}]-[{},{},{}]",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]
        )
    }
}

/// Dense scalar field over a [`Bounds`] region, x-fastest storage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Grid {
    bounds: Bounds,
    data: Vec<f64>,
}

impl Grid {
    /// Wrap existing data; the length must match the box size.
    pub fn new(bounds: Bounds, data: Vec<f64>) -> Result<Self> {
        let expect = usize::try_from(bounds.size())
            .map_err(|_| Error::Config(format!("grid box {bounds} has negative extent")))?;
        if data.len() != expect {
            return Err(Error::Config(format!(
                "grid data length {} does not match box {} ({} cells)",
                data.len(),
                bounds,
                expect
            )));
        }
        Ok(Self { bounds, data })
    }

    /// A grid filled with a constant.
    #[must_use]
    pub fn constant(bounds: Bounds, value: f64) -> Self {
        let n = usize::try_from(bounds.size()).unwrap_or(0);
        Self {
            bounds,
            data: vec![value; n],
        }
    }

    /// The region this grid covers.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Value at position `p`.
    ///
    /// # Panics
    /// Panics if `p` is outside the grid box; callers index only through
    /// mask-validated positions.
    #[inline]
    #[must_use]
    pub fn value(&self, p: Point3) -> f64 {
        let idx = self.bounds.index_of(p).expect("grid access outside bounds");
        self.data[idx as usize]
    }

    /// Set the value at position `p` (same bounds contract as [`Grid::value`]).
    #[inline]
    pub fn set(&mut self, p: Point3, v: f64) {
        let idx = self.bounds.index_of(p).expect("grid access outside bounds");
        self.data[idx as usize] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip_x_fastest() {
        let b = Bounds::new([-1, 0, 2], [2, 3, 4]);
        assert_eq!(b.index_of([-1, 0, 2]), Some(0));
        assert_eq!(b.index_of([0, 0, 2]), Some(1));
        let mut seen = 0;
        for p in b.cells() {
            let idx = b.index_of(p).unwrap();
            assert_eq!(idx, seen);
            assert_eq!(b.position_of(idx), p);
            seen += 1;
        }
        assert_eq!(seen, b.size());
    }

    #[test]
    fn scaling_is_exact_both_ways() {
        assert_eq!(scale_point([3, -1, 2], 1, 2), [6, -2, 4]);
        assert_eq!(scale_point([7, -1, 5], 2, 1), [3, -1, 2]);

        let b = Bounds::new([1, 1, 1], [2, 2, 2]);
        let fine = b.scaled(1, 2);
        assert_eq!(fine, Bounds::new([2, 2, 2], [5, 5, 5]));
        assert_eq!(fine.scaled(2, 1), b);
    }

    #[test]
    fn clip_and_grow() {
        let domain = Bounds::new([0, 0, 0], [7, 7, 7]);
        let core = Bounds::new([0, 0, 0], [3, 7, 7]);
        let bounds = core.grown(1).clipped_to(&domain);
        assert_eq!(bounds, Bounds::new([0, 0, 0], [4, 7, 7]));
    }
}

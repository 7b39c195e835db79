//! Rays and grid traversal.
//!
//! This module provides the ray type consumed by the iterators and a cell
//! walker based on the DDA (Digital Differential Analyzer) algorithm, commonly
//! known as Amanatides & Woo's fast voxel traversal.
//!
//! # Algorithm
//!
//! The walker computes the parametric distance to the next cell boundary on
//! each axis. At each step it advances to the nearest boundary, so every cell
//! pierced by the ray is visited exactly once, in order of increasing `t`.
//!
//! # Example
//!
//! ```
//! use cf_volume::{CellCoord, CellWalk, Ray};
//! use nalgebra::{Point3, Vector3};
//!
//! let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
//! let walk = CellWalk::new(
//!     &ray,
//!     &Point3::origin(),
//!     &Vector3::new(1.0, 1.0, 1.0),
//!     CellCoord::splat(0),
//!     CellCoord::splat(4),
//! );
//!
//! let cells: Vec<_> = walk.map(|(cell, _)| cell.z).collect();
//! assert_eq!(cells, vec![0, 1, 2, 3]);
//! ```

use nalgebra::{Point3, Vector3};

use crate::aabb::Aabb;
use crate::coord::CellCoord;
use crate::range::ValueRange;

/// A ray with a valid parametric range.
///
/// The direction does not need to be normalized, but must be non-zero. Points
/// along the ray are `origin + t * direction` for `t` in `t_range`.
///
/// # Example
///
/// ```
/// use cf_volume::Ray;
/// use nalgebra::{Point3, Vector3};
///
/// let ray = Ray::new(Point3::origin(), Vector3::new(2.0, 0.0, 0.0));
/// let p = ray.point_at(3.0);
/// assert!((p.x - 6.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin of the ray.
    pub origin: Point3<f64>,
    /// The direction of the ray (not necessarily normalized).
    pub direction: Vector3<f64>,
    /// Valid parametric range, `[0, inf)` by default.
    pub t_range: ValueRange,
}

impl Ray {
    /// Creates a ray valid over `[0, inf)`.
    #[must_use]
    pub const fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction,
            t_range: ValueRange {
                lower: 0.0,
                upper: f64::INFINITY,
            },
        }
    }

    /// Restricts the valid parametric range.
    #[must_use]
    pub const fn with_t_range(mut self, t_range: ValueRange) -> Self {
        self.t_range = t_range;
        self
    }

    /// Returns the point along the ray at parameter `t`.
    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    /// Parametric range of the ray inside `aabb`, within `t_range`.
    #[must_use]
    pub fn clip(&self, aabb: &Aabb) -> Option<ValueRange> {
        aabb.intersect_ray(&self.origin, &self.direction, &self.t_range)
    }

    /// Parametric length of a segment of world length `length` along this ray.
    ///
    /// Returns infinity for a zero direction.
    #[must_use]
    pub fn delta_t(&self, length: f64) -> f64 {
        let norm = self.direction.norm();
        if norm < f64::EPSILON {
            f64::INFINITY
        } else {
            length.abs() / norm
        }
    }

    /// Whether the ray can be traversed at all.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.origin.iter().all(|v| v.is_finite())
            && self.direction.iter().all(|v| v.is_finite())
            && self.direction.norm_squared() > 0.0
            && !self.t_range.is_empty()
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Point3::origin(), Vector3::x())
    }
}

/// Traverses the cells of a bounded regular grid along a ray using DDA.
///
/// The grid has cells of size `cell_size` anchored at `grid_origin`; only cells
/// with indices in `[min, max)` are visited. The walker yields `(CellCoord,
/// ValueRange)` pairs where the range is the parametric span of the ray inside
/// the cell. Spans are contiguous, strictly increasing and non-empty.
#[derive(Debug, Clone, Copy)]
pub struct CellWalk {
    /// Current cell.
    current: CellCoord,
    /// Step direction for each axis (-1, 0 or 1).
    step: [i32; 3],
    /// Parametric distance to the next boundary in each axis.
    t_max: [f64; 3],
    /// Parametric distance between boundaries in each axis.
    t_delta: [f64; 3],
    /// Entry parameter of the current cell.
    t_current: f64,
    /// End of the traversal.
    t_end: f64,
    /// Index bounds (min inclusive, max exclusive).
    min: CellCoord,
    max: CellCoord,
    done: bool,
}

impl CellWalk {
    /// Creates a walker over the cells `[min, max)` of the grid.
    ///
    /// The ray is first clipped to the grid's box and its own `t_range`; a ray
    /// that misses produces an empty walk.
    #[must_use]
    pub fn new(
        ray: &Ray,
        grid_origin: &Point3<f64>,
        cell_size: &Vector3<f64>,
        min: CellCoord,
        max: CellCoord,
    ) -> Self {
        let lo = Point3::new(
            f64::from(min.x).mul_add(cell_size.x, grid_origin.x),
            f64::from(min.y).mul_add(cell_size.y, grid_origin.y),
            f64::from(min.z).mul_add(cell_size.z, grid_origin.z),
        );
        let hi = Point3::new(
            f64::from(max.x).mul_add(cell_size.x, grid_origin.x),
            f64::from(max.y).mul_add(cell_size.y, grid_origin.y),
            f64::from(max.z).mul_add(cell_size.z, grid_origin.z),
        );
        let bounds = Aabb::new(lo, hi);

        let mut walk = Self {
            current: min,
            step: [0; 3],
            t_max: [f64::INFINITY; 3],
            t_delta: [f64::INFINITY; 3],
            t_current: 0.0,
            t_end: 0.0,
            min,
            max,
            done: true,
        };

        let Some(span) = ray.clip(&bounds) else {
            return walk;
        };
        if span.upper <= span.lower || !min.within(min, max) {
            return walk;
        }

        // Entry cell; rounding at the box faces is absorbed by the clamp.
        let entry = ray.point_at(span.lower);
        let mut current = [0i32; 3];
        for axis in 0..3 {
            let rel = (entry[axis] - grid_origin[axis]) / cell_size[axis];
            #[allow(clippy::cast_possible_truncation)]
            let index = rel.floor() as i32;
            current[axis] = index.clamp(min[axis], max[axis] - 1);
        }

        for axis in 0..3 {
            let d = ray.direction[axis];
            if d.abs() > 0.0 {
                walk.step[axis] = if d > 0.0 { 1 } else { -1 };
                walk.t_delta[axis] = (cell_size[axis] / d).abs();

                let next = if d > 0.0 { current[axis] + 1 } else { current[axis] };
                let boundary = f64::from(next).mul_add(cell_size[axis], grid_origin[axis]);
                walk.t_max[axis] = (boundary - ray.origin[axis]) / d;
            }
        }

        walk.current = CellCoord::from(current);
        walk.t_current = span.lower;
        walk.t_end = span.upper;
        walk.done = false;
        walk
    }

    /// Parameter at which the walk ends.
    #[must_use]
    pub const fn t_end(&self) -> f64 {
        self.t_end
    }
}

impl Iterator for CellWalk {
    type Item = (CellCoord, ValueRange);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            // Find the axis with the smallest t_max
            let axis = if self.t_max[0] < self.t_max[1] {
                if self.t_max[0] < self.t_max[2] { 0 } else { 2 }
            } else if self.t_max[1] < self.t_max[2] {
                1
            } else {
                2
            };

            let cell = self.current;
            let t_enter = self.t_current;
            let t_exit = self.t_max[axis].min(self.t_end);

            if self.t_max[axis] >= self.t_end {
                self.done = true;
            } else {
                let next = cell[axis].wrapping_add(self.step[axis]);
                if next < self.min[axis] || next >= self.max[axis] {
                    self.done = true;
                } else {
                    self.current = cell.with_axis(axis, next);
                    self.t_max[axis] += self.t_delta[axis];
                }
            }
            self.t_current = self.t_current.max(t_exit);

            if t_exit > t_enter {
                return Some((
                    cell,
                    ValueRange {
                        lower: t_enter,
                        upper: t_exit,
                    },
                ));
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_walk(ray: &Ray, n: i32) -> CellWalk {
        CellWalk::new(
            ray,
            &Point3::origin(),
            &Vector3::new(1.0, 1.0, 1.0),
            CellCoord::splat(0),
            CellCoord::splat(n),
        )
    }

    #[test]
    fn test_ray_point_at() {
        let ray = Ray::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(ray.point_at(1.5), Point3::new(1.0, 3.0, 0.0));
    }

    #[test]
    fn test_ray_delta_t() {
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(ray.delta_t(1.0), 0.5);
        let degenerate = Ray::new(Point3::origin(), Vector3::zeros());
        assert!(degenerate.delta_t(1.0).is_infinite());
        assert!(!degenerate.is_valid());
    }

    #[test]
    fn test_walk_positive_axis() {
        let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
        let cells: Vec<_> = unit_walk(&ray, 3).collect();

        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0].0, CellCoord::new(0, 0, 0));
        assert_relative_eq!(cells[0].1.lower, 1.0);
        assert_relative_eq!(cells[0].1.upper, 2.0);
        assert_relative_eq!(cells[2].1.upper, 4.0);
    }

    #[test]
    fn test_walk_negative_direction() {
        let ray = Ray::new(Point3::new(5.5, 0.5, 0.5), Vector3::new(-1.0, 0.0, 0.0));
        let xs: Vec<_> = unit_walk(&ray, 4).map(|(c, _)| c.x).collect();
        assert_eq!(xs, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_walk_diagonal_contiguous() {
        let ray = Ray::new(Point3::new(-0.3, -0.1, 0.2), Vector3::new(1.0, 0.7, 0.3));
        let cells: Vec<_> = unit_walk(&ray, 4).collect();
        assert!(!cells.is_empty());
        for pair in cells.windows(2) {
            assert_relative_eq!(pair[0].1.upper, pair[1].1.lower);
            assert!(pair[1].1.lower > pair[0].1.lower);
        }
    }

    #[test]
    fn test_walk_respects_t_range() {
        let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z())
            .with_t_range(ValueRange::new(1.5, 2.5));
        let cells: Vec<_> = unit_walk(&ray, 4).collect();
        assert_eq!(cells.len(), 2);
        assert_relative_eq!(cells[0].1.lower, 1.5);
        assert_relative_eq!(cells[1].1.upper, 2.5);
    }

    #[test]
    fn test_walk_miss() {
        let ray = Ray::new(Point3::new(9.0, 0.5, -1.0), Vector3::z());
        assert_eq!(unit_walk(&ray, 4).count(), 0);
    }

    #[test]
    fn test_walk_with_offset_grid() {
        let ray = Ray::new(Point3::new(10.5, 10.5, 10.5), Vector3::x());
        let walk = CellWalk::new(
            &ray,
            &Point3::new(10.0, 10.0, 10.0),
            &Vector3::new(0.5, 0.5, 0.5),
            CellCoord::splat(0),
            CellCoord::splat(4),
        );
        let xs: Vec<_> = walk.map(|(c, _)| c.x).collect();
        assert_eq!(xs, vec![1, 2, 3]);
    }
}

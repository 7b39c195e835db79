//! Lane-batched point and vector types.
//!
//! [`Vec3xN`] stores `W` `Vector3<f64>` values in a structure-of-arrays (`SoA`)
//! layout so per-lane loops over one component auto-vectorize. Lane widths
//! used by the engine are 4, 8 and 16; see [`crate::dispatch`] for which one
//! is native in a given build.

use nalgebra::{Point3, Vector3};

use crate::range::ValueRange;
use crate::ray::Ray;

/// Per-lane activity mask. Inactive lanes must not write outputs.
pub type LaneMask<const W: usize> = [bool; W];

/// Returns a mask with every lane active.
#[must_use]
pub const fn all_lanes<const W: usize>() -> LaneMask<W> {
    [true; W]
}

/// A batch of `W` 3-vectors stored in `SoA` layout.
///
/// # Memory Layout
///
/// ```text
/// xs: [x0, x1, ..., xW-1]
/// ys: [y0, y1, ..., yW-1]
/// zs: [z0, z1, ..., zW-1]
/// ```
///
/// # Example
///
/// ```
/// use cf_volume::Vec3xN;
/// use nalgebra::Vector3;
///
/// let batch = Vec3xN::<4>::splat(Vector3::new(1.0, 2.0, 3.0));
/// assert_eq!(batch.get(3), Vector3::new(1.0, 2.0, 3.0));
/// assert_eq!(batch.norm_squared()[0], 14.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(32))]
pub struct Vec3xN<const W: usize> {
    /// X components of all lanes.
    pub xs: [f64; W],
    /// Y components of all lanes.
    pub ys: [f64; W],
    /// Z components of all lanes.
    pub zs: [f64; W],
}

impl<const W: usize> Default for Vec3xN<W> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<const W: usize> Vec3xN<W> {
    /// Create a batch of zero vectors.
    #[must_use]
    #[inline]
    pub const fn zeros() -> Self {
        Self {
            xs: [0.0; W],
            ys: [0.0; W],
            zs: [0.0; W],
        }
    }

    /// Create from `W` individual vectors.
    #[must_use]
    #[inline]
    pub fn from_vectors(vectors: [Vector3<f64>; W]) -> Self {
        let mut result = Self::zeros();
        for (i, v) in vectors.iter().enumerate() {
            result.set(i, *v);
        }
        result
    }

    /// Create from `W` points.
    #[must_use]
    #[inline]
    pub fn from_points(points: [Point3<f64>; W]) -> Self {
        let mut result = Self::zeros();
        for (i, p) in points.iter().enumerate() {
            result.set(i, p.coords);
        }
        result
    }

    /// Create by broadcasting a single vector to all lanes.
    #[must_use]
    #[inline]
    pub fn splat(v: Vector3<f64>) -> Self {
        Self {
            xs: [v.x; W],
            ys: [v.y; W],
            zs: [v.z; W],
        }
    }

    /// Extract the vector at a given lane.
    #[must_use]
    #[inline]
    pub fn get(&self, lane: usize) -> Vector3<f64> {
        debug_assert!(lane < W);
        Vector3::new(self.xs[lane], self.ys[lane], self.zs[lane])
    }

    /// Extract the lane as a point.
    #[must_use]
    #[inline]
    pub fn point(&self, lane: usize) -> Point3<f64> {
        Point3::from(self.get(lane))
    }

    /// Overwrite one lane.
    #[inline]
    pub fn set(&mut self, lane: usize, v: Vector3<f64>) {
        debug_assert!(lane < W);
        self.xs[lane] = v.x;
        self.ys[lane] = v.y;
        self.zs[lane] = v.z;
    }

    /// Compute squared norm of each lane.
    #[must_use]
    #[inline]
    pub fn norm_squared(&self) -> [f64; W] {
        let mut result = [0.0; W];

        for i in 0..W {
            result[i] = self.xs[i] * self.xs[i];
        }
        for i in 0..W {
            result[i] += self.ys[i] * self.ys[i];
        }
        for i in 0..W {
            result[i] += self.zs[i] * self.zs[i];
        }

        result
    }
}

/// `W` rays in `SoA` layout, one per lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayN<const W: usize> {
    /// Ray origins.
    pub origins: Vec3xN<W>,
    /// Ray directions.
    pub directions: Vec3xN<W>,
    /// Valid parametric range of each lane.
    pub t_ranges: [ValueRange; W],
}

impl<const W: usize> RayN<W> {
    /// Broadcasts one ray to every lane.
    #[must_use]
    pub fn splat(ray: &Ray) -> Self {
        Self {
            origins: Vec3xN::splat(ray.origin.coords),
            directions: Vec3xN::splat(ray.direction),
            t_ranges: [ray.t_range; W],
        }
    }

    /// Builds the batch from individual rays.
    #[must_use]
    pub fn from_rays(rays: &[Ray; W]) -> Self {
        let mut result = Self::splat(&Ray::default());
        for (lane, ray) in rays.iter().enumerate() {
            result.origins.set(lane, ray.origin.coords);
            result.directions.set(lane, ray.direction);
            result.t_ranges[lane] = ray.t_range;
        }
        result
    }

    /// Extracts the ray of one lane.
    #[must_use]
    pub fn ray(&self, lane: usize) -> Ray {
        Ray::new(self.origins.point(lane), self.directions.get(lane)).with_t_range(self.t_ranges[lane])
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vectors_roundtrip_lanes() {
        let batch = Vec3xN::<4>::from_vectors([
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(4.0, 5.0, 6.0),
            Vector3::new(7.0, 8.0, 9.0),
            Vector3::new(10.0, 11.0, 12.0),
        ]);
        assert_eq!(batch.xs, [1.0, 4.0, 7.0, 10.0]);
        assert_eq!(batch.get(2), Vector3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_set_touches_one_lane() {
        let mut batch = Vec3xN::<8>::zeros();
        batch.set(5, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(batch.norm_squared()[5], 3.0);
        assert_eq!(batch.norm_squared()[4], 0.0);
    }

    #[test]
    fn test_points() {
        let batch = Vec3xN::<16>::from_points([Point3::new(0.5, 0.5, -1.0); 16]);
        assert_eq!(batch.point(15), Point3::new(0.5, 0.5, -1.0));
    }

    #[test]
    fn test_ray_batch_lanes() {
        let a = Ray::new(Point3::new(0.0, 0.0, -1.0), Vector3::z());
        let b = Ray::new(Point3::new(1.0, 0.0, 0.0), Vector3::x())
            .with_t_range(ValueRange::new(0.0, 2.0));
        let batch = RayN::<4>::from_rays(&[a, b, a, a]);
        assert_eq!(batch.ray(1), b);
        assert_eq!(batch.ray(3), a);
        assert_eq!(RayN::<4>::splat(&b).ray(2), b);
    }

    #[test]
    fn test_all_lanes() {
        assert!(all_lanes::<8>().iter().all(|&v| v));
    }
}

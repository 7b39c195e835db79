//! The numeric kernel interface shared by every representation.
//!
//! The iterator engine and the sampler never look inside a representation's
//! data to evaluate it; they go through [`VolumeKernel`]. Kernels assume they
//! are only called on committed volumes with validated attribute indices and
//! times, and return NaN (or the background value) outside their support.

use nalgebra::{Point3, Vector3};

use crate::aabb::Aabb;
use crate::config::Filter;
use crate::range::ValueRange;

/// Per-representation evaluation primitives.
pub trait VolumeKernel {
    /// Bounding box of the volume's support in object space.
    fn bounding_box(&self) -> Aabb;

    /// Number of attributes.
    fn attribute_count(&self) -> usize;

    /// Value range of an attribute over the whole volume.
    fn value_range(&self, attribute: usize) -> ValueRange;

    /// Whether `point` lies where the volume has data.
    fn contains(&self, point: &Point3<f64>) -> bool {
        self.bounding_box().contains(point)
    }

    /// Samples an attribute at a point.
    fn sample(&self, point: &Point3<f64>, attribute: usize, time: f64, filter: Filter) -> f64;

    /// Gradient of an attribute at a point.
    ///
    /// The default uses central differences over half a nominal cell,
    /// falling back to a one-sided difference where one neighbor is
    /// undefined.
    fn gradient(
        &self,
        point: &Point3<f64>,
        attribute: usize,
        time: f64,
        filter: Filter,
    ) -> Vector3<f64> {
        let h = 0.5 * self.nominal_cell_size();
        let center = self.sample(point, attribute, time, filter);
        let mut gradient = Vector3::zeros();

        for axis in 0..3 {
            let mut offset = Vector3::zeros();
            offset[axis] = h;
            let forward = self.sample(&(point + offset), attribute, time, filter);
            let backward = self.sample(&(point - offset), attribute, time, filter);

            gradient[axis] = match (forward.is_nan(), backward.is_nan()) {
                (false, false) => (forward - backward) / (2.0 * h),
                (false, true) => (forward - center) / h,
                (true, false) => (center - backward) / h,
                (true, true) => f64::NAN,
            };
        }
        gradient
    }

    /// Characteristic length of the finest cell.
    fn nominal_cell_size(&self) -> f64;
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub(crate) fn lerp(a: f64, b: f64, t: f64) -> f64 {
    t.mul_add(b - a, a)
}

/// Trilinear interpolation of corner values `c[x][y][z]` at fractions `f`.
#[inline]
pub(crate) fn trilinear(c: &[[[f64; 2]; 2]; 2], f: &Vector3<f64>) -> f64 {
    let x00 = lerp(c[0][0][0], c[1][0][0], f.x);
    let x10 = lerp(c[0][1][0], c[1][1][0], f.x);
    let x01 = lerp(c[0][0][1], c[1][0][1], f.x);
    let x11 = lerp(c[0][1][1], c[1][1][1], f.x);
    let y0 = lerp(x00, x10, f.y);
    let y1 = lerp(x01, x11, f.y);
    lerp(y0, y1, f.z)
}

/// Splits a continuous index into a lower cell index in `[0, n - 2]` and the
/// fractional position inside that cell.
///
/// Returns `None` outside `[0, n - 1]`.
#[inline]
pub(crate) fn cell_and_fraction(index: f64, n: usize) -> Option<(usize, f64)> {
    #[allow(clippy::cast_precision_loss)]
    let last = (n - 1) as f64;
    if !(0.0..=last).contains(&index) {
        return None;
    }
    if n == 1 {
        return Some((0, 0.0));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cell = (index.floor() as usize).min(n - 2);
    #[allow(clippy::cast_precision_loss)]
    let fraction = index - cell as f64;
    Some((cell, fraction))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Linear;

    impl VolumeKernel for Linear {
        fn bounding_box(&self) -> Aabb {
            Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
        }

        fn attribute_count(&self) -> usize {
            1
        }

        fn value_range(&self, _attribute: usize) -> ValueRange {
            ValueRange::new(0.0, 6.0)
        }

        fn sample(&self, p: &Point3<f64>, _: usize, _: f64, _: Filter) -> f64 {
            if self.contains(p) {
                p.x + 2.0 * p.y + 3.0 * p.z
            } else {
                f64::NAN
            }
        }

        fn nominal_cell_size(&self) -> f64 {
            0.1
        }
    }

    #[test]
    fn test_default_gradient() {
        let g = Linear.gradient(&Point3::new(0.5, 0.5, 0.5), 0, 0.0, Filter::Trilinear);
        assert_relative_eq!(g, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-9);
    }

    #[test]
    fn test_gradient_one_sided_at_boundary() {
        let g = Linear.gradient(&Point3::new(0.0, 1.0, 0.5), 0, 0.0, Filter::Trilinear);
        assert_relative_eq!(g, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-9);
    }

    #[test]
    fn test_trilinear_corners_and_center() {
        let mut c = [[[0.0; 2]; 2]; 2];
        c[1][1][1] = 8.0;
        assert_eq!(trilinear(&c, &Vector3::new(1.0, 1.0, 1.0)), 8.0);
        assert_relative_eq!(trilinear(&c, &Vector3::new(0.5, 0.5, 0.5)), 1.0);
    }

    #[test]
    fn test_cell_and_fraction() {
        assert_eq!(cell_and_fraction(2.5, 4), Some((2, 0.5)));
        assert_eq!(cell_and_fraction(3.0, 4), Some((2, 1.0)));
        assert_eq!(cell_and_fraction(-0.1, 4), None);
        assert_eq!(cell_and_fraction(3.1, 4), None);
        assert_eq!(cell_and_fraction(0.0, 1), Some((0, 0.0)));
    }
}

//! Radial basis function particle volumes.
//!
//! Every particle contributes a Gaussian kernel `w * exp(-d² / (2 r²))` of
//! its weight `w` and radius `r`, truncated at `radius_support_factor * r`.
//! The value at a point is the sum of every contribution; there is no
//! background. Node ranges of the particle hierarchy are combined by sum
//! since kernels add where supports overlap.

use std::ops::ControlFlow;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, RangeCombine};
use crate::config::{BvhConfig, Filter};
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;

use super::kernel::VolumeKernel;

/// Default truncation radius, in multiples of the particle radius.
pub const DEFAULT_RADIUS_SUPPORT_FACTOR: f64 = 3.0;

/// A set of Gaussian particles with a single attribute.
///
/// # Example
///
/// ```
/// use cf_volume::{Filter, ParticleVolume, VolumeKernel};
/// use nalgebra::Point3;
///
/// let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![1.0]);
/// particles.commit().unwrap();
///
/// assert_eq!(particles.sample(&Point3::origin(), 0, 0.0, Filter::Trilinear), 1.0);
/// assert_eq!(particles.sample(&Point3::new(4.0, 0.0, 0.0), 0, 0.0, Filter::Trilinear), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct ParticleVolume {
    positions: Vec<Point3<f64>>,
    radii: Vec<f64>,
    weights: Option<Vec<f64>>,
    radius_support_factor: f64,
    clamp_max_cumulative_value: f64,
    bvh_config: BvhConfig,
    derived: Option<ParticleDerived>,
}

#[derive(Debug, Clone)]
struct ParticleDerived {
    bvh: Bvh,
    value_range: ValueRange,
}

impl ParticleVolume {
    /// Creates an uncommitted volume of unit-weight particles.
    #[must_use]
    pub fn new(positions: Vec<Point3<f64>>, radii: Vec<f64>) -> Self {
        Self {
            positions,
            radii,
            weights: None,
            radius_support_factor: DEFAULT_RADIUS_SUPPORT_FACTOR,
            clamp_max_cumulative_value: 0.0,
            bvh_config: BvhConfig::default(),
            derived: None,
        }
    }

    /// Set per-particle weights; particles default to weight 1.
    pub fn set_weights(&mut self, weights: Vec<f64>) {
        self.weights = Some(weights);
        self.derived = None;
    }

    /// Set the kernel truncation radius in multiples of the particle radius.
    pub fn set_radius_support_factor(&mut self, factor: f64) {
        self.radius_support_factor = factor;
        self.derived = None;
    }

    /// Clamp summed values to at most `max`; 0 disables clamping.
    pub fn set_clamp_max_cumulative_value(&mut self, max: f64) {
        self.clamp_max_cumulative_value = max;
        self.derived = None;
    }

    /// Set the hierarchy build parameters.
    pub fn set_bvh_config(&mut self, config: BvhConfig) {
        self.bvh_config = config;
        self.derived = None;
    }

    /// Number of particles.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.derived.is_some()
    }

    pub(crate) fn bvh(&self) -> Option<&Bvh> {
        self.derived.as_ref().map(|d| &d.bvh)
    }

    fn weight(&self, particle: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[particle])
    }

    fn support(&self, particle: usize) -> Aabb {
        let r = self.radii[particle] * self.radius_support_factor;
        Aabb::from_center(self.positions[particle], Vector3::new(r, r, r))
    }

    /// Validate particle arrays and build the particle hierarchy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty particle set, mismatched
    /// array lengths, non-positive radii or a non-positive support factor.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        self.bvh_config.validate()?;
        if self.positions.is_empty() {
            return Err(VolumeError::invalid_config("particle volume has no particles"));
        }
        if self.radii.len() != self.positions.len() {
            return Err(VolumeError::AttributeSizeMismatch {
                name: "radius".to_owned(),
                expected: self.positions.len(),
                actual: self.radii.len(),
            });
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.positions.len() {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: "weight".to_owned(),
                    expected: self.positions.len(),
                    actual: weights.len(),
                });
            }
        }
        if self.radii.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(VolumeError::invalid_config("particle radii must be positive"));
        }
        if !self.radius_support_factor.is_finite() || self.radius_support_factor <= 0.0 {
            return Err(VolumeError::invalid_config(
                "radius support factor must be positive",
            ));
        }
        if self.clamp_max_cumulative_value.is_nan() || self.clamp_max_cumulative_value < 0.0 {
            return Err(VolumeError::invalid_config(
                "clamp max cumulative value must be >= 0",
            ));
        }

        let boxes: Vec<Aabb> = (0..self.positions.len())
            .into_par_iter()
            .map(|p| self.support(p))
            .collect();
        let mut bvh = Bvh::build(&boxes, &self.bvh_config, RangeCombine::Sum);
        bvh.compute_node_data(
            1,
            |p, _| {
                let w = self.weight(p as usize);
                ValueRange::new(w.min(0.0), w.max(0.0))
            },
            |p| self.radii[p as usize],
        );

        let mut value_range = bvh.root().map_or_else(ValueRange::empty, |r| r.ranges[0]);
        if self.clamp_max_cumulative_value > 0.0 {
            value_range.upper = value_range.upper.min(self.clamp_max_cumulative_value);
            value_range.lower = value_range.lower.min(value_range.upper);
        }

        debug!(
            particles = self.positions.len(),
            bvh_depth = bvh.depth(),
            support_factor = self.radius_support_factor,
            "committed particle volume"
        );

        self.derived = Some(ParticleDerived { bvh, value_range });
        Ok(())
    }

    fn contribution(&self, particle: usize, point: &Point3<f64>) -> f64 {
        let r = self.radii[particle];
        let d2 = (point - self.positions[particle]).norm_squared();
        let cutoff = r * self.radius_support_factor;
        if d2 > cutoff * cutoff {
            return 0.0;
        }
        self.weight(particle) * (-d2 / (2.0 * r * r)).exp()
    }
}

impl VolumeKernel for ParticleVolume {
    fn bounding_box(&self) -> Aabb {
        if let Some(root) = self.bvh().and_then(Bvh::root) {
            return root.bbox;
        }
        (0..self.positions.len().min(self.radii.len()))
            .fold(Aabb::empty(), |acc, p| acc.union(&self.support(p)))
    }

    fn attribute_count(&self) -> usize {
        1
    }

    fn value_range(&self, _attribute: usize) -> ValueRange {
        self.derived
            .as_ref()
            .map_or_else(ValueRange::empty, |d| d.value_range)
    }

    fn sample(&self, point: &Point3<f64>, _attribute: usize, _time: f64, _filter: Filter) -> f64 {
        let Some(bvh) = self.bvh() else {
            return f64::NAN;
        };
        let mut value = 0.0;
        bvh.for_each_containing(point, |p| {
            value += self.contribution(p as usize, point);
            ControlFlow::Continue(())
        });
        if self.clamp_max_cumulative_value > 0.0 {
            value = value.min(self.clamp_max_cumulative_value);
        }
        value
    }

    /// Analytic gradient of the summed kernels.
    fn gradient(
        &self,
        point: &Point3<f64>,
        _attribute: usize,
        _time: f64,
        _filter: Filter,
    ) -> Vector3<f64> {
        let Some(bvh) = self.bvh() else {
            return Vector3::repeat(f64::NAN);
        };
        let mut gradient = Vector3::zeros();
        bvh.for_each_containing(point, |p| {
            let p = p as usize;
            let r = self.radii[p];
            gradient -= (point - self.positions[p]) * (self.contribution(p, point) / (r * r));
            ControlFlow::Continue(())
        });
        gradient
    }

    fn nominal_cell_size(&self) -> f64 {
        self.bvh()
            .and_then(Bvh::root)
            .map_or(1.0, |root| root.nominal_size)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_commit_validates() {
        let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![]);
        assert!(matches!(
            particles.commit(),
            Err(VolumeError::AttributeSizeMismatch { .. })
        ));

        let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![0.0]);
        assert!(particles.commit().is_err_and(|e| e.is_config_error()));

        let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![1.0]);
        particles.set_weights(vec![1.0, 2.0]);
        assert!(particles.commit().is_err());
    }

    #[test]
    fn test_overlapping_kernels_sum() {
        let mut particles = ParticleVolume::new(
            vec![Point3::new(-0.5, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0)],
            vec![1.0, 1.0],
        );
        particles.set_weights(vec![2.0, 1.0]);
        particles.commit().unwrap();

        let expected = 3.0 * (-0.125_f64).exp();
        assert_relative_eq!(
            particles.sample(&Point3::origin(), 0, 0.0, Filter::Nearest),
            expected,
            epsilon = 1e-12
        );
        assert_eq!(particles.value_range(0), ValueRange::new(0.0, 3.0));
    }

    #[test]
    fn test_support_truncation_and_clamp() {
        let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![1.0]);
        particles.set_radius_support_factor(1.0);
        particles.set_clamp_max_cumulative_value(0.5);
        particles.commit().unwrap();

        assert_eq!(particles.sample(&Point3::new(1.5, 0.0, 0.0), 0, 0.0, Filter::Trilinear), 0.0);
        assert_eq!(particles.sample(&Point3::origin(), 0, 0.0, Filter::Trilinear), 0.5);
        assert_eq!(particles.value_range(0).upper, 0.5);
        assert_relative_eq!(particles.bounding_box().max.x, 1.0);
    }

    #[test]
    fn test_analytic_gradient() {
        let mut particles = ParticleVolume::new(vec![Point3::origin()], vec![1.0]);
        particles.commit().unwrap();

        let p = Point3::new(0.5, 0.0, 0.0);
        let g = particles.gradient(&p, 0, 0.0, Filter::Trilinear);
        assert_relative_eq!(g.x, -0.5 * (-0.125_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(g.y, 0.0);
        assert_relative_eq!(g.z, 0.0);
    }
}

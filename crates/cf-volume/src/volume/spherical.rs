//! Structured grids in spherical coordinates.
//!
//! Logical axes are radius, inclination (polar angle from +z) and azimuth
//! (angle from +x in the xy plane). Angles are given in degrees. Every
//! object-space point must map to a unique logical coordinate, so commit
//! requires radius >= 0, inclination in [0, 180] and azimuth in [0, 360].
//! Spacing may be negative on any axis.

use std::f64::consts::TAU;

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::aabb::Aabb;
use crate::config::Filter;
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;

use super::Attribute;
use super::kernel::VolumeKernel;
use super::structured::GridData;

/// A structured grid in (radius, inclination, azimuth) coordinates.
///
/// # Example
///
/// ```
/// use cf_volume::{Attribute, StructuredSphericalVolume};
/// use nalgebra::Vector3;
///
/// let mut shell = StructuredSphericalVolume::new([2, 2, 2]);
/// shell.set_grid_origin(Vector3::new(1.0, 0.0, 0.0));
/// shell.set_grid_spacing(Vector3::new(1.0, 180.0, 360.0));
/// shell.add_attribute(Attribute::new("r", vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]));
/// assert!(shell.commit().is_ok());
///
/// shell.set_grid_spacing(Vector3::new(1.0, 190.0, 360.0));
/// assert!(shell.commit().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StructuredSphericalVolume {
    grid: GridData,
    /// (radius, inclination degrees, azimuth degrees) of vertex (0, 0, 0).
    grid_origin: Vector3<f64>,
    grid_spacing: Vector3<f64>,
    background: f64,
    filter: Filter,
    derived: Option<SphericalDerived>,
}

#[derive(Debug, Clone)]
struct SphericalDerived {
    value_ranges: Vec<ValueRange>,
    radius_max: f64,
    origin_radians: Vector3<f64>,
    spacing_radians: Vector3<f64>,
}

impl StructuredSphericalVolume {
    /// Creates an uncommitted grid with `dimensions` vertices per logical axis.
    ///
    /// The default origin is (0, 0, 0) with unit spacing.
    #[must_use]
    pub fn new(dimensions: [usize; 3]) -> Self {
        Self {
            grid: GridData::new(dimensions),
            grid_origin: Vector3::zeros(),
            grid_spacing: Vector3::new(1.0, 1.0, 1.0),
            background: f64::NAN,
            filter: Filter::default(),
            derived: None,
        }
    }

    /// Set the logical coordinate of vertex (0, 0, 0): radius, inclination
    /// and azimuth, angles in degrees.
    pub fn set_grid_origin(&mut self, origin: Vector3<f64>) {
        self.grid_origin = origin;
        self.derived = None;
    }

    /// Set the logical spacing between vertices, angles in degrees.
    pub fn set_grid_spacing(&mut self, spacing: Vector3<f64>) {
        self.grid_spacing = spacing;
        self.derived = None;
    }

    /// Set the number of samples stored per vertex.
    pub fn set_time_steps(&mut self, time_steps: usize) {
        self.grid.time_steps = time_steps;
        self.derived = None;
    }

    /// Set the value returned outside the grid.
    pub fn set_background(&mut self, background: f64) {
        self.background = background;
        self.derived = None;
    }

    /// Set the interpolation filter.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.derived = None;
    }

    /// Append an attribute.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.grid.attributes.push(attribute);
        self.derived = None;
    }

    /// The value returned outside the grid.
    #[must_use]
    pub const fn background(&self) -> f64 {
        self.background
    }

    /// The interpolation filter.
    #[must_use]
    pub const fn filter(&self) -> Filter {
        self.filter
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.derived.is_some()
    }

    /// Range covered by one logical axis, ordered even for negative spacing.
    fn axis_range(&self, axis: usize) -> ValueRange {
        #[allow(clippy::cast_precision_loss)]
        let steps = self.grid.dimensions[axis].saturating_sub(1) as f64;
        ValueRange::new(
            self.grid_origin[axis],
            steps.mul_add(self.grid_spacing[axis], self.grid_origin[axis]),
        )
    }

    /// Validate the logical coordinate ranges and compute value ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for negative radii, inclinations outside
    /// [0, 180], azimuths outside [0, 360], zero spacing or malformed
    /// attributes.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        self.grid.validate()?;
        let s = self.grid_spacing;
        if !(s.iter().all(|v| v.is_finite() && *v != 0.0)) {
            return Err(VolumeError::InvalidSpacing {
                x: s.x,
                y: s.y,
                z: s.z,
            });
        }

        let radius = self.axis_range(0);
        if radius.lower < 0.0 {
            return Err(VolumeError::invalid_config(
                "spherical grid radius values must be >= 0",
            ));
        }
        let inclination = self.axis_range(1);
        if inclination.lower < 0.0 || inclination.upper > 180.0 {
            return Err(VolumeError::invalid_config(
                "spherical grid inclination values must be in [0, 180] degrees",
            ));
        }
        let azimuth = self.axis_range(2);
        if azimuth.lower < 0.0 || azimuth.upper > 360.0 {
            return Err(VolumeError::invalid_config(
                "spherical grid azimuth values must be in [0, 360] degrees",
            ));
        }

        let to_radians = Vector3::new(1.0, 1.0_f64.to_radians(), 1.0_f64.to_radians());
        let value_ranges = self.grid.attributes.iter().map(Attribute::range).collect();

        debug!(
            dimensions = ?self.grid.dimensions,
            attributes = self.grid.attributes.len(),
            radius_max = radius.upper,
            "committed structured spherical volume"
        );

        self.derived = Some(SphericalDerived {
            value_ranges,
            radius_max: radius.upper,
            origin_radians: self.grid_origin.component_mul(&to_radians),
            spacing_radians: self.grid_spacing.component_mul(&to_radians),
        });
        Ok(())
    }
}

impl VolumeKernel for StructuredSphericalVolume {
    /// Conservative box of the full sphere of the largest radius.
    fn bounding_box(&self) -> Aabb {
        let r = self.axis_range(0).upper.max(0.0);
        Aabb::new(Point3::new(-r, -r, -r), Point3::new(r, r, r))
    }

    fn attribute_count(&self) -> usize {
        self.grid.attributes.len()
    }

    fn value_range(&self, attribute: usize) -> ValueRange {
        let Some(derived) = &self.derived else {
            return ValueRange::empty();
        };
        let mut range = derived.value_ranges.get(attribute).copied().unwrap_or_default();
        range.extend(self.background);
        range
    }

    fn sample(&self, point: &Point3<f64>, attribute: usize, time: f64, filter: Filter) -> f64 {
        let Some(derived) = &self.derived else {
            return self.background;
        };

        let r = point.coords.norm();
        let inclination = if r > 0.0 { (point.z / r).clamp(-1.0, 1.0).acos() } else { 0.0 };
        let mut azimuth = point.y.atan2(point.x);
        if azimuth < 0.0 {
            azimuth += TAU;
        }

        let logical = Vector3::new(r, inclination, azimuth);
        let index = (logical - derived.origin_radians).component_div(&derived.spacing_radians);
        self.grid
            .sample_index(&index, attribute, time, filter)
            .unwrap_or(self.background)
    }

    /// Smallest of the radial spacing and the arc lengths at the outer radius.
    fn nominal_cell_size(&self) -> f64 {
        let Some(derived) = &self.derived else {
            return self.grid_spacing.x.abs();
        };
        let radial = derived.spacing_radians.x.abs();
        let arcs = [derived.spacing_radians.y, derived.spacing_radians.z]
            .map(|a| a.abs() * derived.radius_max)
            .into_iter()
            .filter(|&a| a > 0.0)
            .fold(f64::INFINITY, f64::min);
        radial.min(arcs)
    }
}

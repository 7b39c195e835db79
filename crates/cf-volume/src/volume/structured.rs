//! Dense structured grids with vertex-centred data.
//!
//! [`GridData`] holds the vertex arrays shared by the regular and spherical
//! grids, including temporally structured data: every vertex stores
//! `time_steps` consecutive samples that are interpolated linearly over
//! normalized time [0, 1].
//!
//! Vertex `(x, y, z)` at time step `t` lives at index
//! `((z * ny + y) * nx + x) * time_steps + t` of every attribute array.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::aabb::Aabb;
use crate::config::Filter;
use crate::coord::CellCoord;
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;
use crate::ray::{CellWalk, Ray};

use super::Attribute;
use super::kernel::{VolumeKernel, cell_and_fraction, lerp, trilinear};

/// Cells per macro-cell edge, as a power of two.
pub const MACROCELL_LOG2: u32 = 4;

/// Cells per macro-cell edge.
pub const MACROCELL_SIZE: usize = 1 << MACROCELL_LOG2;

/// Vertex arrays of a structured grid.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GridData {
    pub dimensions: [usize; 3],
    pub time_steps: usize,
    pub attributes: Vec<Attribute>,
}

impl GridData {
    pub(crate) const fn new(dimensions: [usize; 3]) -> Self {
        Self {
            dimensions,
            time_steps: 1,
            attributes: Vec::new(),
        }
    }

    pub(crate) const fn vertex_count(&self) -> usize {
        self.dimensions[0] * self.dimensions[1] * self.dimensions[2]
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let [x, y, z] = self.dimensions;
        if x < 2 || y < 2 || z < 2 {
            return Err(VolumeError::InvalidDimensions { x, y, z });
        }
        if self.time_steps == 0 {
            return Err(VolumeError::invalid_config("time_steps must be >= 1"));
        }
        if self.attributes.is_empty() {
            return Err(VolumeError::invalid_config("volume has no attributes"));
        }
        let expected = self.vertex_count() * self.time_steps;
        for attribute in &self.attributes {
            if attribute.data.len() != expected {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: attribute.name.clone(),
                    expected,
                    actual: attribute.data.len(),
                });
            }
        }
        Ok(())
    }

    #[inline]
    fn base_index(&self, v: [usize; 3]) -> usize {
        let [nx, ny, _] = self.dimensions;
        ((v[2] * ny + v[1]) * nx + v[0]) * self.time_steps
    }

    /// Value of one vertex at a normalized time.
    #[inline]
    pub(crate) fn vertex_value(&self, attribute: usize, v: [usize; 3], time: f64) -> f64 {
        let data = &self.attributes[attribute].data;
        let base = self.base_index(v);
        if self.time_steps == 1 {
            return data[base];
        }
        #[allow(clippy::cast_precision_loss)]
        let t = time * (self.time_steps - 1) as f64;
        let (step, fraction) = cell_and_fraction(t, self.time_steps).unwrap_or((0, 0.0));
        lerp(data[base + step], data[base + step + 1], fraction)
    }

    /// Samples at a continuous vertex index; `None` outside the grid.
    pub(crate) fn sample_index(
        &self,
        index: &Vector3<f64>,
        attribute: usize,
        time: f64,
        filter: Filter,
    ) -> Option<f64> {
        let mut cell = [0usize; 3];
        let mut fraction = Vector3::zeros();
        for axis in 0..3 {
            let (c, f) = cell_and_fraction(index[axis], self.dimensions[axis])?;
            cell[axis] = c;
            fraction[axis] = f;
        }

        match filter {
            Filter::Nearest => {
                let v = [0, 1, 2].map(|a| cell[a] + usize::from(fraction[a] >= 0.5));
                Some(self.vertex_value(attribute, v, time))
            }
            Filter::Trilinear => {
                let corners = self.cell_corners(attribute, cell, time);
                Some(trilinear(&corners, &fraction))
            }
        }
    }

    fn cell_corners(&self, attribute: usize, cell: [usize; 3], time: f64) -> [[[f64; 2]; 2]; 2] {
        let mut corners = [[[0.0; 2]; 2]; 2];
        for (dx, plane) in corners.iter_mut().enumerate() {
            for (dy, row) in plane.iter_mut().enumerate() {
                for (dz, value) in row.iter_mut().enumerate() {
                    *value = self.vertex_value(
                        attribute,
                        [cell[0] + dx, cell[1] + dy, cell[2] + dz],
                        time,
                    );
                }
            }
        }
        corners
    }

    /// Range of the eight corner values of a cell at a given time.
    pub(crate) fn cell_range(&self, attribute: usize, cell: [usize; 3], time: f64) -> ValueRange {
        let mut range = ValueRange::empty();
        for plane in self.cell_corners(attribute, cell, time) {
            for row in plane {
                for value in row {
                    range.extend(value);
                }
            }
        }
        range
    }

    /// Range of every vertex value in `[lo, hi]` (inclusive) over all time steps.
    fn block_range(&self, attribute: usize, lo: [usize; 3], hi: [usize; 3]) -> ValueRange {
        let data = &self.attributes[attribute].data;
        let mut range = ValueRange::empty();
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                let start = self.base_index([lo[0], y, z]);
                let end = self.base_index([hi[0], y, z]) + self.time_steps;
                for &value in &data[start..end] {
                    range.extend(value);
                }
            }
        }
        range
    }
}

/// A structured grid with axis-aligned, uniformly spaced vertices.
///
/// The grid spans `grid_origin` to `grid_origin + (dimensions - 1) *
/// grid_spacing`. Interval iteration walks 16³-cell macro-cells whose value
/// ranges are computed at commit, or single cells for elementary iteration.
///
/// # Example
///
/// ```
/// use cf_volume::{Attribute, StructuredRegularVolume, Volume, Sampler};
/// use nalgebra::{Point3, Vector3};
/// use std::sync::Arc;
///
/// let mut grid = StructuredRegularVolume::new([2, 2, 2]);
/// grid.add_attribute(Attribute::new("density", vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]));
///
/// let mut volume = Volume::from(grid);
/// volume.commit().unwrap();
///
/// let sampler = Sampler::new(Arc::new(volume)).unwrap();
/// let value = sampler.sample(&Point3::new(0.25, 0.5, 0.5), 0, 0.0).unwrap();
/// assert!((value - 0.25).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct StructuredRegularVolume {
    grid: GridData,
    grid_origin: Point3<f64>,
    grid_spacing: Vector3<f64>,
    background: f64,
    filter: Filter,
    derived: Option<RegularDerived>,
}

#[derive(Debug, Clone)]
struct RegularDerived {
    value_ranges: Vec<ValueRange>,
    macrocell_dims: [usize; 3],
    /// `[attribute][macro-cell]`, x fastest.
    macrocell_ranges: Vec<Vec<ValueRange>>,
}

impl StructuredRegularVolume {
    /// Creates an uncommitted grid with `dimensions` vertices per axis, unit
    /// spacing and its origin at zero.
    #[must_use]
    pub fn new(dimensions: [usize; 3]) -> Self {
        Self {
            grid: GridData::new(dimensions),
            grid_origin: Point3::origin(),
            grid_spacing: Vector3::new(1.0, 1.0, 1.0),
            background: f64::NAN,
            filter: Filter::default(),
            derived: None,
        }
    }

    /// Set the object-space position of vertex `(0, 0, 0)`.
    pub fn set_grid_origin(&mut self, origin: Point3<f64>) {
        self.grid_origin = origin;
        self.derived = None;
    }

    /// Set the distance between vertices along each axis.
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

    /// Vertex counts per axis.
    #[must_use]
    pub const fn dimensions(&self) -> [usize; 3] {
        self.grid.dimensions
    }

    /// Object-space position of vertex `(0, 0, 0)`.
    #[must_use]
    pub const fn grid_origin(&self) -> Point3<f64> {
        self.grid_origin
    }

    /// Distance between vertices along each axis.
    #[must_use]
    pub const fn grid_spacing(&self) -> Vector3<f64> {
        self.grid_spacing
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

    /// Samples stored per vertex.
    #[must_use]
    pub const fn time_steps(&self) -> usize {
        self.grid.time_steps
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.derived.is_some()
    }

    /// Validate parameters and compute per-attribute and macro-cell ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for fewer than two vertices on an axis,
    /// non-positive spacing, or attribute arrays of the wrong length.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        self.grid.validate()?;
        let s = self.grid_spacing;
        if !(s.iter().all(|v| v.is_finite() && *v > 0.0)) {
            return Err(VolumeError::InvalidSpacing {
                x: s.x,
                y: s.y,
                z: s.z,
            });
        }

        let macrocell_dims = self
            .grid
            .dimensions
            .map(|n| (n - 1).div_ceil(MACROCELL_SIZE));
        let count = macrocell_dims[0] * macrocell_dims[1] * macrocell_dims[2];

        let grid = &self.grid;
        let macrocell_ranges: Vec<Vec<ValueRange>> = (0..grid.attributes.len())
            .map(|attribute| {
                (0..count)
                    .into_par_iter()
                    .map(|m| {
                        let coord = [
                            m % macrocell_dims[0],
                            (m / macrocell_dims[0]) % macrocell_dims[1],
                            m / (macrocell_dims[0] * macrocell_dims[1]),
                        ];
                        let lo = coord.map(|c| c * MACROCELL_SIZE);
                        let hi = [0, 1, 2]
                            .map(|a| (lo[a] + MACROCELL_SIZE).min(grid.dimensions[a] - 1));
                        grid.block_range(attribute, lo, hi)
                    })
                    .collect()
            })
            .collect();

        let value_ranges = macrocell_ranges
            .iter()
            .map(|ranges| {
                ranges
                    .iter()
                    .fold(ValueRange::empty(), |acc, r| acc.union(r))
            })
            .collect();

        debug!(
            dimensions = ?self.grid.dimensions,
            attributes = self.grid.attributes.len(),
            time_steps = self.grid.time_steps,
            macrocells = count,
            "committed structured regular volume"
        );

        self.derived = Some(RegularDerived {
            value_ranges,
            macrocell_dims,
            macrocell_ranges,
        });
        Ok(())
    }

    fn to_index(&self, point: &Point3<f64>) -> Vector3<f64> {
        (point - self.grid_origin).component_div(&self.grid_spacing)
    }

    /// Cell walk over macro-cells, or over single cells when `elementary`.
    pub(crate) fn walk(&self, ray: &Ray, elementary: bool) -> CellWalk {
        let clipped = ray.with_t_range(ray.clip(&self.bounding_box()).unwrap_or_default());
        let (cell_size, max) = match (&self.derived, elementary) {
            (Some(derived), false) => (
                self.grid_spacing * f64::from(1u32 << MACROCELL_LOG2),
                to_coord(derived.macrocell_dims),
            ),
            _ => (self.grid_spacing, to_coord(self.grid.dimensions.map(|n| n - 1))),
        };
        CellWalk::new(&clipped, &self.grid_origin, &cell_size, CellCoord::splat(0), max)
    }

    /// Value range of attribute values over a macro-cell.
    pub(crate) fn macrocell_range(&self, coord: CellCoord, attribute: usize) -> ValueRange {
        let Some(derived) = &self.derived else {
            return ValueRange::empty();
        };
        let [mx, my, _] = derived.macrocell_dims;
        #[allow(clippy::cast_sign_loss)]
        let index = (coord.z as usize * my + coord.y as usize) * mx + coord.x as usize;
        derived.macrocell_ranges[attribute]
            .get(index)
            .copied()
            .unwrap_or_default()
    }

    /// Value range over one cell at a given time.
    pub(crate) fn cell_range(&self, coord: CellCoord, attribute: usize, time: f64) -> ValueRange {
        #[allow(clippy::cast_sign_loss)]
        let cell = coord.as_array().map(|c| c as usize);
        self.grid.cell_range(attribute, cell, time)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn to_coord(v: [usize; 3]) -> CellCoord {
    CellCoord::new(v[0] as i32, v[1] as i32, v[2] as i32)
}

impl VolumeKernel for StructuredRegularVolume {
    fn bounding_box(&self) -> Aabb {
        #[allow(clippy::cast_precision_loss)]
        let extent = Vector3::from(self.grid.dimensions.map(|n| n.saturating_sub(1) as f64));
        Aabb::new(
            self.grid_origin,
            self.grid_origin + extent.component_mul(&self.grid_spacing),
        )
    }

    fn attribute_count(&self) -> usize {
        self.grid.attributes.len()
    }

    fn value_range(&self, attribute: usize) -> ValueRange {
        self.derived
            .as_ref()
            .and_then(|d| d.value_ranges.get(attribute).copied())
            .unwrap_or_default()
    }

    fn sample(&self, point: &Point3<f64>, attribute: usize, time: f64, filter: Filter) -> f64 {
        self.grid
            .sample_index(&self.to_index(point), attribute, time, filter)
            .unwrap_or(self.background)
    }

    fn nominal_cell_size(&self) -> f64 {
        self.grid_spacing.min()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `n`³ grid over [0, 1]³ with values `f(x, y, z)`.
    fn grid(n: usize, f: impl Fn(f64, f64, f64) -> f64) -> StructuredRegularVolume {
        let h = 1.0 / (n - 1) as f64;
        let mut data = Vec::with_capacity(n * n * n);
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    data.push(f(x as f64 * h, y as f64 * h, z as f64 * h));
                }
            }
        }
        let mut volume = StructuredRegularVolume::new([n, n, n]);
        volume.set_grid_spacing(Vector3::new(h, h, h));
        volume.add_attribute(Attribute::new("f", data));
        volume
    }

    #[test]
    fn test_commit_validates() {
        let mut volume = StructuredRegularVolume::new([1, 4, 4]);
        volume.add_attribute(Attribute::new("f", vec![0.0; 16]));
        assert!(matches!(volume.commit(), Err(VolumeError::InvalidDimensions { .. })));

        let mut volume = StructuredRegularVolume::new([2, 2, 2]);
        assert!(volume.commit().is_err_and(|e| e.is_config_error()));

        volume.add_attribute(Attribute::new("f", vec![0.0; 7]));
        assert!(matches!(volume.commit(), Err(VolumeError::AttributeSizeMismatch { .. })));

        let mut volume = grid(3, |_, _, _| 0.0);
        volume.set_grid_spacing(Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(volume.commit(), Err(VolumeError::InvalidSpacing { .. })));
    }

    #[test]
    fn test_setter_clears_commit() {
        let mut volume = grid(3, |_, _, z| z);
        volume.commit().unwrap();
        assert!(volume.is_committed());
        volume.set_background(0.0);
        assert!(!volume.is_committed());
    }

    #[test]
    fn test_trilinear_reproduces_linear_field() {
        let mut volume = grid(9, |x, y, z| x + 2.0 * y - z);
        volume.commit().unwrap();
        let p = Point3::new(0.3, 0.71, 0.05);
        assert_relative_eq!(
            volume.sample(&p, 0, 0.0, Filter::Trilinear),
            0.3 + 1.42 - 0.05,
            epsilon = 1e-12
        );
        assert!(volume.sample(&Point3::new(1.1, 0.5, 0.5), 0, 0.0, Filter::Trilinear).is_nan());
    }

    #[test]
    fn test_nearest_filter() {
        let mut volume = grid(3, |x, _, _| x);
        volume.commit().unwrap();
        assert_eq!(volume.sample(&Point3::new(0.2, 0.5, 0.5), 0, 0.0, Filter::Nearest), 0.0);
        assert_eq!(volume.sample(&Point3::new(0.3, 0.5, 0.5), 0, 0.0, Filter::Nearest), 0.5);
    }

    #[test]
    fn test_time_steps_interpolate() {
        let mut volume = StructuredRegularVolume::new([2, 2, 2]);
        volume.set_time_steps(3);
        let mut data = Vec::new();
        for _ in 0..8 {
            data.extend_from_slice(&[0.0, 1.0, 4.0]);
        }
        volume.add_attribute(Attribute::new("t", data));
        volume.commit().unwrap();

        let p = Point3::new(0.5, 0.5, 0.5);
        assert_relative_eq!(volume.sample(&p, 0, 0.25, Filter::Trilinear), 0.5);
        assert_relative_eq!(volume.sample(&p, 0, 0.75, Filter::Trilinear), 2.5);
        assert_relative_eq!(volume.sample(&p, 0, 1.0, Filter::Trilinear), 4.0);
        assert_eq!(volume.value_range(0), ValueRange::new(0.0, 4.0));
    }

    #[test]
    fn test_macrocell_ranges() {
        let mut volume = grid(33, |_, _, z| z);
        volume.commit().unwrap();
        assert_eq!(volume.value_range(0), ValueRange::new(0.0, 1.0));

        let lower = volume.macrocell_range(CellCoord::new(0, 0, 0), 0);
        let upper = volume.macrocell_range(CellCoord::new(1, 1, 1), 0);
        assert_relative_eq!(lower.upper, 0.5);
        assert_relative_eq!(upper.lower, 0.5);
        assert_relative_eq!(upper.upper, 1.0);
    }

    #[test]
    fn test_walk_macrocells_and_cells() {
        let mut volume = grid(33, |_, _, z| z);
        volume.commit().unwrap();
        let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
        assert_eq!(volume.walk(&ray, false).count(), 2);
        assert_eq!(volume.walk(&ray, true).count(), 32);
    }
}

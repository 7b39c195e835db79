//! Unstructured meshes of tetrahedra and hexahedra.
//!
//! Attributes are either vertex-centred (interpolated inside each cell) or
//! cell-centred (constant per cell). Cells are indexed by a [`Bvh`]; a point
//! takes its value from the first cell found to contain it.
//!
//! Hexahedron vertices follow the usual order: the bottom face
//! `(0,0,0) (1,0,0) (1,1,0) (0,1,0)` then the top face in the same order.
//! Points inside a hexahedron are mapped to local coordinates by Newton
//! iteration on the trilinear map.

use std::ops::ControlFlow;

use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, RangeCombine};
use crate::config::{BvhConfig, Filter};
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;

use super::Attribute;
use super::kernel::VolumeKernel;

/// Tolerance on barycentric and local coordinates at cell faces.
const INSIDE_TOLERANCE: f64 = 1e-9;

/// Newton iterations for hexahedron inversion.
const MAX_NEWTON_ITERATIONS: usize = 16;

/// Local coordinates of the hexahedron corners.
const HEX_CORNERS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// A mesh cell given by vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cell {
    /// Four vertices.
    Tetrahedron([u32; 4]),
    /// Eight vertices.
    Hexahedron([u32; 8]),
}

impl Cell {
    /// Vertex indices of the cell.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        match self {
            Self::Tetrahedron(v) => v.as_slice(),
            Self::Hexahedron(v) => v.as_slice(),
        }
    }
}

/// Where attribute values are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Centering {
    /// One value per vertex.
    Vertex,
    /// One value per cell.
    Cell,
}

/// An unstructured mesh volume.
///
/// # Example
///
/// ```
/// use cf_volume::{Attribute, Cell, UnstructuredVolume, VolumeKernel, Filter};
/// use nalgebra::Point3;
///
/// let mut mesh = UnstructuredVolume::new(vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ]);
/// mesh.add_cell(Cell::Tetrahedron([0, 1, 2, 3]));
/// mesh.add_attribute(Attribute::new("x", vec![0.0, 1.0, 0.0, 0.0]));
/// mesh.commit().unwrap();
///
/// let v = mesh.sample(&Point3::new(0.2, 0.1, 0.1), 0, 0.0, Filter::Trilinear);
/// assert!((v - 0.2).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct UnstructuredVolume {
    vertices: Vec<Point3<f64>>,
    cells: Vec<Cell>,
    attributes: Vec<(Attribute, Centering)>,
    background: f64,
    bvh_config: BvhConfig,
    derived: Option<UnstructuredDerived>,
}

#[derive(Debug, Clone)]
struct UnstructuredDerived {
    bvh: Bvh,
    value_ranges: Vec<ValueRange>,
}

impl UnstructuredVolume {
    /// Creates an uncommitted mesh over the given vertices.
    #[must_use]
    pub fn new(vertices: Vec<Point3<f64>>) -> Self {
        Self {
            vertices,
            cells: Vec::new(),
            attributes: Vec::new(),
            background: f64::NAN,
            bvh_config: BvhConfig::default(),
            derived: None,
        }
    }

    /// Append a cell.
    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
        self.derived = None;
    }

    /// Append a vertex-centred attribute.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push((attribute, Centering::Vertex));
        self.derived = None;
    }

    /// Append a cell-centred attribute.
    pub fn add_cell_attribute(&mut self, attribute: Attribute) {
        self.attributes.push((attribute, Centering::Cell));
        self.derived = None;
    }

    /// Set the value returned outside every cell.
    pub fn set_background(&mut self, background: f64) {
        self.background = background;
        self.derived = None;
    }

    /// Set the hierarchy build parameters.
    pub fn set_bvh_config(&mut self, config: BvhConfig) {
        self.bvh_config = config;
        self.derived = None;
    }

    /// The value returned outside every cell.
    #[must_use]
    pub const fn background(&self) -> f64 {
        self.background
    }

    /// Number of cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.derived.is_some()
    }

    /// The committed cell hierarchy.
    pub(crate) fn bvh(&self) -> Option<&Bvh> {
        self.derived.as_ref().map(|d| &d.bvh)
    }

    /// Validate topology and build the cell hierarchy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty mesh, out-of-range vertex
    /// indices or attribute arrays of the wrong length.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        self.bvh_config.validate()?;
        if self.cells.is_empty() {
            return Err(VolumeError::invalid_config("mesh has no cells"));
        }
        if self.attributes.is_empty() {
            return Err(VolumeError::invalid_config("volume has no attributes"));
        }
        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(&v) = cell.indices().iter().find(|&&v| v as usize >= self.vertices.len()) {
                return Err(VolumeError::invalid_config(format!(
                    "cell {i} references vertex {v}, mesh has {}",
                    self.vertices.len()
                )));
            }
        }
        for (attribute, centering) in &self.attributes {
            let expected = match centering {
                Centering::Vertex => self.vertices.len(),
                Centering::Cell => self.cells.len(),
            };
            if attribute.data.len() != expected {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: attribute.name.clone(),
                    expected,
                    actual: attribute.data.len(),
                });
            }
        }

        let boxes: Vec<Aabb> = self.cells.par_iter().map(|c| self.cell_bounds(c)).collect();
        let mut bvh = Bvh::build(&boxes, &self.bvh_config, RangeCombine::Union);
        bvh.compute_node_data(
            self.attributes.len(),
            |c, a| self.cell_range(c as usize, a),
            |c| {
                let size = boxes[c as usize].size();
                let min = size.min();
                if min > 0.0 { min } else { size.max() }
            },
        );

        let value_ranges = bvh
            .root()
            .map(|root| root.ranges.to_vec())
            .unwrap_or_default();

        debug!(
            vertices = self.vertices.len(),
            cells = self.cells.len(),
            attributes = self.attributes.len(),
            bvh_depth = bvh.depth(),
            "committed unstructured volume"
        );

        self.derived = Some(UnstructuredDerived { bvh, value_ranges });
        Ok(())
    }

    fn cell_bounds(&self, cell: &Cell) -> Aabb {
        let mut bbox = Aabb::empty();
        for &v in cell.indices() {
            bbox.expand_to_include(&self.vertices[v as usize]);
        }
        bbox
    }

    fn cell_range(&self, cell: usize, attribute: usize) -> ValueRange {
        let (attribute, centering) = &self.attributes[attribute];
        match centering {
            Centering::Cell => {
                let mut range = ValueRange::empty();
                range.extend(attribute.data[cell]);
                range
            }
            Centering::Vertex => {
                let mut range = ValueRange::empty();
                for &v in self.cells[cell].indices() {
                    range.extend(attribute.data[v as usize]);
                }
                range
            }
        }
    }

    /// Interpolation weights of `point` inside a cell, `None` outside.
    fn weights(&self, cell: &Cell, point: &Point3<f64>) -> Option<([f64; 8], usize)> {
        match cell {
            Cell::Tetrahedron(idx) => {
                let v = idx.map(|i| self.vertices[i as usize]);
                let m = Matrix3::from_columns(&[v[1] - v[0], v[2] - v[0], v[3] - v[0]]);
                let l = m.try_inverse()? * (point - v[0]);
                let w = [1.0 - l.x - l.y - l.z, l.x, l.y, l.z];
                w.iter()
                    .all(|&x| x >= -INSIDE_TOLERANCE)
                    .then_some(([w[0], w[1], w[2], w[3], 0.0, 0.0, 0.0, 0.0], 4))
            }
            Cell::Hexahedron(idx) => {
                let v = idx.map(|i| self.vertices[i as usize]);
                let u = invert_trilinear(&v, point)?;
                Some((hex_shape(&u), 8))
            }
        }
    }

    fn interpolate(&self, cell: usize, point: &Point3<f64>, attribute: usize) -> Option<f64> {
        let c = &self.cells[cell];
        let (weights, n) = self.weights(c, point)?;
        let (attribute, centering) = &self.attributes[attribute];
        Some(match centering {
            Centering::Cell => attribute.data[cell],
            Centering::Vertex => c.indices()[..n]
                .iter()
                .zip(weights)
                .map(|(&v, w)| w * attribute.data[v as usize])
                .sum(),
        })
    }
}

/// Trilinear shape functions at local coordinates `u`.
fn hex_shape(u: &Vector3<f64>) -> [f64; 8] {
    HEX_CORNERS.map(|c| {
        (0..3)
            .map(|a| if c[a] > 0.5 { u[a] } else { 1.0 - u[a] })
            .product::<f64>()
    })
}

/// Position and Jacobian of the trilinear map at local coordinates `u`.
fn hex_map(v: &[Point3<f64>; 8], u: &Vector3<f64>) -> (Vector3<f64>, Matrix3<f64>) {
    let mut position = Vector3::zeros();
    let mut jacobian = Matrix3::zeros();
    for (corner, p) in HEX_CORNERS.iter().zip(v) {
        let factor = |a: usize| if corner[a] > 0.5 { u[a] } else { 1.0 - u[a] };
        let sign = |a: usize| if corner[a] > 0.5 { 1.0 } else { -1.0 };
        let f = [factor(0), factor(1), factor(2)];
        position += p.coords * (f[0] * f[1] * f[2]);
        let d = Vector3::new(sign(0) * f[1] * f[2], f[0] * sign(1) * f[2], f[0] * f[1] * sign(2));
        for axis in 0..3 {
            jacobian.column_mut(axis).axpy(d[axis], &p.coords, 1.0);
        }
    }
    (position, jacobian)
}

/// Local coordinates of `point` in a hexahedron, `None` outside.
fn invert_trilinear(v: &[Point3<f64>; 8], point: &Point3<f64>) -> Option<Vector3<f64>> {
    let mut bbox = Aabb::empty();
    for p in v {
        bbox.expand_to_include(p);
    }
    if !bbox.contains(point) {
        return None;
    }
    let tolerance = 1e-12 * bbox.size().max().max(f64::MIN_POSITIVE);

    let mut u = Vector3::new(0.5, 0.5, 0.5);
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (position, jacobian) = hex_map(v, &u);
        let residual = position - point.coords;
        if residual.norm() <= tolerance {
            break;
        }
        u -= jacobian.try_inverse()? * residual;
    }

    let (position, _) = hex_map(v, &u);
    let converged = (position - point.coords).norm() <= 1e-6 * bbox.size().max();
    let inside = u
        .iter()
        .all(|&x| (-INSIDE_TOLERANCE..=1.0 + INSIDE_TOLERANCE).contains(&x));
    (converged && inside).then_some(u)
}

impl VolumeKernel for UnstructuredVolume {
    fn bounding_box(&self) -> Aabb {
        if let Some(root) = self.bvh().and_then(Bvh::root) {
            return root.bbox;
        }
        let mut bbox = Aabb::empty();
        for p in &self.vertices {
            bbox.expand_to_include(p);
        }
        bbox
    }

    fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    fn value_range(&self, attribute: usize) -> ValueRange {
        self.derived
            .as_ref()
            .and_then(|d| d.value_ranges.get(attribute).copied())
            .unwrap_or_default()
    }

    fn sample(&self, point: &Point3<f64>, attribute: usize, _time: f64, _filter: Filter) -> f64 {
        let Some(bvh) = self.bvh() else {
            return self.background;
        };
        let mut value = self.background;
        bvh.for_each_containing(point, |cell| {
            match self.interpolate(cell as usize, point, attribute) {
                Some(v) => {
                    value = v;
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        });
        value
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

    fn unit_cube_vertices(offset: f64) -> Vec<Point3<f64>> {
        HEX_CORNERS
            .iter()
            .map(|c| Point3::new(c[0] + offset, c[1], c[2]))
            .collect()
    }

    #[test]
    fn test_commit_validates_indices() {
        let mut mesh = UnstructuredVolume::new(unit_cube_vertices(0.0));
        mesh.add_cell(Cell::Tetrahedron([0, 1, 2, 9]));
        mesh.add_attribute(Attribute::new("f", vec![0.0; 8]));
        assert!(mesh.commit().is_err_and(|e| e.is_config_error()));
    }

    #[test]
    fn test_commit_validates_sizes() {
        let mut mesh = UnstructuredVolume::new(unit_cube_vertices(0.0));
        mesh.add_cell(Cell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7]));
        mesh.add_cell_attribute(Attribute::new("f", vec![0.0; 8]));
        assert!(matches!(mesh.commit(), Err(VolumeError::AttributeSizeMismatch { .. })));
    }

    #[test]
    fn test_hexahedron_trilinear() {
        let mut vertices = unit_cube_vertices(0.0);
        // Skew the top face; the map stays trilinear.
        for v in &mut vertices[4..] {
            v.x += 0.25;
        }
        let values: Vec<f64> = vertices.iter().map(|p| p.z).collect();
        let mut mesh = UnstructuredVolume::new(vertices);
        mesh.add_cell(Cell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7]));
        mesh.add_attribute(Attribute::new("z", values));
        mesh.commit().unwrap();

        let v = mesh.sample(&Point3::new(0.6, 0.5, 0.4), 0, 0.0, Filter::Trilinear);
        assert_relative_eq!(v, 0.4, epsilon = 1e-9);
        assert!(mesh.sample(&Point3::new(0.05, 0.5, 0.9), 0, 0.0, Filter::Trilinear).is_nan());
    }

    #[test]
    fn test_cell_centred_values() {
        let mut vertices = unit_cube_vertices(0.0);
        vertices.extend(unit_cube_vertices(1.0));
        let mut mesh = UnstructuredVolume::new(vertices);
        mesh.add_cell(Cell::Hexahedron([0, 1, 2, 3, 4, 5, 6, 7]));
        mesh.add_cell(Cell::Hexahedron([8, 9, 10, 11, 12, 13, 14, 15]));
        mesh.add_cell_attribute(Attribute::new("id", vec![3.0, 7.0]));
        mesh.commit().unwrap();

        assert_eq!(mesh.sample(&Point3::new(0.5, 0.5, 0.5), 0, 0.0, Filter::Nearest), 3.0);
        assert_eq!(mesh.sample(&Point3::new(1.5, 0.5, 0.5), 0, 0.0, Filter::Nearest), 7.0);
        assert_eq!(mesh.value_range(0), ValueRange::new(3.0, 7.0));
        assert_eq!(mesh.bounding_box().max, Point3::new(2.0, 1.0, 1.0));
    }
}

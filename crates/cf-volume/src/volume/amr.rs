//! Adaptive mesh refinement grids.
//!
//! An AMR volume is a set of axis-aligned blocks of cell-centred data. Each
//! block lives on a refinement level with its own cell width; finer levels
//! overlay coarser ones. A point takes its value from the finest block that
//! contains it, interpolated trilinearly between that block's cell centres
//! (clamped at the block faces).

use std::ops::ControlFlow;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, RangeCombine};
use crate::config::{BvhConfig, Filter};
use crate::coord::CellCoord;
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;

use super::kernel::{VolumeKernel, trilinear};

/// A block of cell-centred values on one refinement level.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmrBlock {
    /// Refinement level; 0 is the coarsest.
    pub level: usize,
    /// Index of the block's first cell on its level.
    pub origin: CellCoord,
    /// Cells per axis.
    pub dimensions: [usize; 3],
    /// Cell values, x fastest.
    pub data: Vec<f64>,
}

impl AmrBlock {
    /// Creates a block.
    #[must_use]
    pub const fn new(level: usize, origin: CellCoord, dimensions: [usize; 3], data: Vec<f64>) -> Self {
        Self {
            level,
            origin,
            dimensions,
            data,
        }
    }

    fn value(&self, cell: [usize; 3]) -> f64 {
        let [nx, ny, _] = self.dimensions;
        self.data[(cell[2] * ny + cell[1]) * nx + cell[0]]
    }
}

/// An AMR volume with a single attribute.
///
/// # Example
///
/// ```
/// use cf_volume::{AmrBlock, AmrVolume, CellCoord, Filter, VolumeKernel};
/// use nalgebra::Point3;
///
/// let mut amr = AmrVolume::new(vec![1.0, 0.5]);
/// amr.add_block(AmrBlock::new(0, CellCoord::splat(0), [2, 2, 2], vec![1.0; 8]));
/// amr.add_block(AmrBlock::new(1, CellCoord::splat(0), [2, 2, 2], vec![5.0; 8]));
/// amr.commit().unwrap();
///
/// // The fine block covers [0, 1]³ and wins there.
/// assert_eq!(amr.sample(&Point3::new(0.5, 0.5, 0.5), 0, 0.0, Filter::Trilinear), 5.0);
/// assert_eq!(amr.sample(&Point3::new(1.5, 1.5, 1.5), 0, 0.0, Filter::Trilinear), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct AmrVolume {
    grid_origin: Point3<f64>,
    grid_spacing: Vector3<f64>,
    /// Cell width of each level, in units of `grid_spacing`.
    cell_widths: Vec<f64>,
    blocks: Vec<AmrBlock>,
    background: f64,
    bvh_config: BvhConfig,
    derived: Option<AmrDerived>,
}

#[derive(Debug, Clone)]
struct AmrDerived {
    bvh: Bvh,
    value_range: ValueRange,
}

impl AmrVolume {
    /// Creates an uncommitted volume with the given cell width per level.
    #[must_use]
    pub fn new(cell_widths: Vec<f64>) -> Self {
        Self {
            grid_origin: Point3::origin(),
            grid_spacing: Vector3::new(1.0, 1.0, 1.0),
            cell_widths,
            blocks: Vec::new(),
            background: f64::NAN,
            bvh_config: BvhConfig::default().max_leaf_size(1),
            derived: None,
        }
    }

    /// Set the object-space position of cell index zero.
    pub fn set_grid_origin(&mut self, origin: Point3<f64>) {
        self.grid_origin = origin;
        self.derived = None;
    }

    /// Set the scale applied to every level's cell width.
    pub fn set_grid_spacing(&mut self, spacing: Vector3<f64>) {
        self.grid_spacing = spacing;
        self.derived = None;
    }

    /// Append a block.
    pub fn add_block(&mut self, block: AmrBlock) {
        self.blocks.push(block);
        self.derived = None;
    }

    /// Set the value returned outside every block.
    pub fn set_background(&mut self, background: f64) {
        self.background = background;
        self.derived = None;
    }

    /// Set the hierarchy build parameters.
    pub fn set_bvh_config(&mut self, config: BvhConfig) {
        self.bvh_config = config;
        self.derived = None;
    }

    /// The value returned outside every block.
    #[must_use]
    pub const fn background(&self) -> f64 {
        self.background
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.derived.is_some()
    }

    pub(crate) fn bvh(&self) -> Option<&Bvh> {
        self.derived.as_ref().map(|d| &d.bvh)
    }

    fn cell_size(&self, level: usize) -> Vector3<f64> {
        self.grid_spacing * self.cell_widths[level]
    }

    fn block_bounds(&self, block: &AmrBlock) -> Aabb {
        let size = self.cell_size(block.level);
        let lo = Vector3::from(block.origin.as_array().map(f64::from));
        #[allow(clippy::cast_precision_loss)]
        let hi = lo + Vector3::from(block.dimensions.map(|n| n as f64));
        Aabb::new(
            self.grid_origin + lo.component_mul(&size),
            self.grid_origin + hi.component_mul(&size),
        )
    }

    /// Validate the level layout and build the block hierarchy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or non-decreasing cell
    /// widths, blocks on undeclared levels, empty blocks or block data of the
    /// wrong length.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        self.bvh_config.validate()?;
        if self.blocks.is_empty() {
            return Err(VolumeError::invalid_config("AMR volume has no blocks"));
        }
        if self.cell_widths.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(VolumeError::invalid_config("AMR cell widths must be positive"));
        }
        if self.cell_widths.windows(2).any(|w| w[1] >= w[0]) {
            return Err(VolumeError::invalid_config(
                "AMR cell widths must decrease with level",
            ));
        }
        let s = self.grid_spacing;
        if !(s.iter().all(|v| v.is_finite() && *v > 0.0)) {
            return Err(VolumeError::InvalidSpacing {
                x: s.x,
                y: s.y,
                z: s.z,
            });
        }
        for (i, block) in self.blocks.iter().enumerate() {
            if block.level >= self.cell_widths.len() {
                return Err(VolumeError::invalid_config(format!(
                    "block {i} is on level {} but only {} levels are declared",
                    block.level,
                    self.cell_widths.len()
                )));
            }
            let [x, y, z] = block.dimensions;
            if x == 0 || y == 0 || z == 0 {
                return Err(VolumeError::InvalidDimensions { x, y, z });
            }
            if block.data.len() != x * y * z {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: format!("block {i}"),
                    expected: x * y * z,
                    actual: block.data.len(),
                });
            }
        }

        let boxes: Vec<Aabb> = self.blocks.par_iter().map(|b| self.block_bounds(b)).collect();
        let mut bvh = Bvh::build(&boxes, &self.bvh_config, RangeCombine::Union);
        bvh.compute_node_data(
            1,
            |b, _| {
                let mut range = ValueRange::empty();
                for &v in &self.blocks[b as usize].data {
                    range.extend(v);
                }
                range
            },
            |b| self.cell_size(self.blocks[b as usize].level).min(),
        );
        let value_range = bvh.root().map_or_else(ValueRange::empty, |r| r.ranges[0]);

        debug!(
            blocks = self.blocks.len(),
            levels = self.cell_widths.len(),
            bvh_depth = bvh.depth(),
            "committed AMR volume"
        );

        self.derived = Some(AmrDerived { bvh, value_range });
        Ok(())
    }

    /// Trilinear interpolation between the cell centres of one block.
    fn interpolate(&self, block: &AmrBlock, point: &Point3<f64>, filter: Filter) -> f64 {
        let size = self.cell_size(block.level);
        let bounds = self.block_bounds(block);
        let local = (point - bounds.min).component_div(&size);

        let mut cell = [0usize; 3];
        let mut fraction = Vector3::zeros();
        for axis in 0..3 {
            #[allow(clippy::cast_precision_loss)]
            let last = (block.dimensions[axis] - 1) as f64;
            let centred = match filter {
                Filter::Nearest => local[axis].floor(),
                Filter::Trilinear => local[axis] - 0.5,
            }
            .clamp(0.0, last);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let c = (centred.floor() as usize).min(block.dimensions[axis].saturating_sub(2));
            cell[axis] = c;
            #[allow(clippy::cast_precision_loss)]
            let f = centred - c as f64;
            fraction[axis] = f;
        }

        let mut corners = [[[0.0; 2]; 2]; 2];
        for (dx, plane) in corners.iter_mut().enumerate() {
            for (dy, row) in plane.iter_mut().enumerate() {
                for (dz, value) in row.iter_mut().enumerate() {
                    let c = [
                        (cell[0] + dx).min(block.dimensions[0] - 1),
                        (cell[1] + dy).min(block.dimensions[1] - 1),
                        (cell[2] + dz).min(block.dimensions[2] - 1),
                    ];
                    *value = block.value(c);
                }
            }
        }
        trilinear(&corners, &fraction)
    }
}

impl VolumeKernel for AmrVolume {
    fn bounding_box(&self) -> Aabb {
        if let Some(root) = self.bvh().and_then(Bvh::root) {
            return root.bbox;
        }
        self.blocks
            .iter()
            .filter(|b| b.level < self.cell_widths.len())
            .fold(Aabb::empty(), |acc, b| acc.union(&self.block_bounds(b)))
    }

    fn attribute_count(&self) -> usize {
        1
    }

    fn value_range(&self, _attribute: usize) -> ValueRange {
        self.derived
            .as_ref()
            .map_or_else(ValueRange::empty, |d| d.value_range)
    }

    fn sample(&self, point: &Point3<f64>, _attribute: usize, _time: f64, filter: Filter) -> f64 {
        let Some(bvh) = self.bvh() else {
            return self.background;
        };
        let mut finest: Option<&AmrBlock> = None;
        bvh.for_each_containing(point, |b| {
            let block = &self.blocks[b as usize];
            if finest.is_none_or(|f| block.level > f.level) && self.block_bounds(block).contains(point) {
                finest = Some(block);
            }
            ControlFlow::Continue(())
        });
        finest.map_or(self.background, |block| self.interpolate(block, point, filter))
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
    fn test_commit_validates_levels() {
        let mut amr = AmrVolume::new(vec![1.0]);
        amr.add_block(AmrBlock::new(1, CellCoord::splat(0), [1, 1, 1], vec![0.0]));
        assert!(amr.commit().is_err_and(|e| e.is_config_error()));

        let mut amr = AmrVolume::new(vec![1.0, 1.0]);
        amr.add_block(AmrBlock::new(0, CellCoord::splat(0), [1, 1, 1], vec![0.0]));
        assert!(amr.commit().is_err());

        let mut amr = AmrVolume::new(vec![1.0]);
        amr.add_block(AmrBlock::new(0, CellCoord::splat(0), [2, 1, 1], vec![0.0]));
        assert!(matches!(amr.commit(), Err(VolumeError::AttributeSizeMismatch { .. })));
    }

    #[test]
    fn test_interpolates_cell_centres() {
        let mut amr = AmrVolume::new(vec![1.0]);
        amr.add_block(AmrBlock::new(
            0,
            CellCoord::splat(0),
            [2, 1, 1],
            vec![0.0, 1.0],
        ));
        amr.commit().unwrap();

        // Cell centres at x = 0.5 and 1.5.
        assert_relative_eq!(amr.sample(&Point3::new(1.0, 0.5, 0.5), 0, 0.0, Filter::Trilinear), 0.5);
        assert_relative_eq!(amr.sample(&Point3::new(0.1, 0.5, 0.5), 0, 0.0, Filter::Trilinear), 0.0);
        assert_relative_eq!(amr.sample(&Point3::new(1.9, 0.5, 0.5), 0, 0.0, Filter::Trilinear), 1.0);
        assert_eq!(amr.sample(&Point3::new(1.2, 0.5, 0.5), 0, 0.0, Filter::Nearest), 1.0);
        assert!(amr.sample(&Point3::new(2.5, 0.5, 0.5), 0, 0.0, Filter::Trilinear).is_nan());
    }

    #[test]
    fn test_finest_block_wins() {
        let mut amr = AmrVolume::new(vec![2.0, 1.0]);
        amr.set_grid_origin(Point3::new(-1.0, -1.0, -1.0));
        amr.add_block(AmrBlock::new(0, CellCoord::splat(0), [2, 2, 2], vec![1.0; 8]));
        amr.add_block(AmrBlock::new(1, CellCoord::splat(1), [1, 1, 1], vec![9.0]));
        amr.commit().unwrap();

        assert_eq!(amr.sample(&Point3::new(0.5, 0.5, 0.5), 0, 0.0, Filter::Trilinear), 9.0);
        assert_eq!(amr.sample(&Point3::new(2.0, 2.0, 2.0), 0, 0.0, Filter::Trilinear), 1.0);
        assert_eq!(amr.value_range(0), ValueRange::new(1.0, 9.0));
        assert_relative_eq!(amr.nominal_cell_size(), 1.0);
        assert_eq!(amr.bounding_box().max, Point3::new(3.0, 3.0, 3.0));
    }
}

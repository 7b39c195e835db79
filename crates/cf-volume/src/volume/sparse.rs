//! Sparse hierarchical grids.
//!
//! A fixed four-level tree of axis-aligned nodes over an unbounded voxel
//! lattice. Level 0 nodes span 512³ voxels, level 1 128³, level 2 32³ and
//! level 3 (the leaves) 8³. Active data is either a dense leaf of 8³ voxels
//! per attribute, or a constant tile at any level. Everything else is
//! inactive and takes the background value.
//!
//! Voxel `i` covers index space `[i, i + 1)` with its value at the centre;
//! object space is `index_origin + index * spacing`. Node value ranges are
//! dilated by their 26 neighbours so they bound trilinear interpolation
//! across node faces.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::debug;

use crate::aabb::Aabb;
use crate::config::Filter;
use crate::coord::CellCoord;
use crate::error::{Result, VolumeError};
use crate::range::ValueRange;
use crate::ray::{CellWalk, Ray};

use super::kernel::{VolumeKernel, trilinear};

/// Number of tree levels.
pub const LEVEL_COUNT: usize = 4;

/// Node extent per level in voxels, as powers of two.
pub const LEVEL_LOG2: [u32; LEVEL_COUNT] = [9, 7, 5, 3];

/// Deepest level, holding the dense leaves.
pub const LEAF_LEVEL: usize = LEVEL_COUNT - 1;

/// Voxels per leaf edge.
pub const LEAF_SIZE: usize = 1 << LEVEL_LOG2[LEAF_LEVEL];

/// Voxels per leaf.
pub const LEAF_VOXELS: usize = LEAF_SIZE * LEAF_SIZE * LEAF_SIZE;

type Ranges = SmallVec<[ValueRange; 2]>;

#[derive(Debug, Clone)]
enum NodeContent {
    Internal,
    Tile(SmallVec<[f64; 2]>),
    Leaf(usize),
}

#[derive(Debug, Clone)]
struct SparseNode {
    content: NodeContent,
    ranges: Ranges,
}

#[derive(Debug, Clone)]
struct SparseLeaf {
    origin: CellCoord,
    /// One array of [`LEAF_VOXELS`] values per attribute, x fastest.
    data: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct SparseTile {
    level: usize,
    origin: CellCoord,
    values: Vec<f64>,
}

#[derive(Debug, Clone)]
struct SparseDerived {
    levels: [HashMap<CellCoord, SparseNode>; LEVEL_COUNT],
    /// Level-0 key bounds, max exclusive.
    root_min: CellCoord,
    root_max: CellCoord,
    value_ranges: Vec<ValueRange>,
    bounds: Aabb,
}

/// A sparse hierarchical grid of leaves and tiles.
///
/// # Example
///
/// ```
/// use cf_volume::{CellCoord, Filter, SparseHierarchicalVolume, VolumeKernel};
/// use nalgebra::Point3;
///
/// let mut grid = SparseHierarchicalVolume::new(1);
/// grid.add_tile(2, CellCoord::splat(0), vec![4.0]);
/// grid.set_background(0.0);
/// grid.commit().unwrap();
///
/// assert_eq!(grid.sample(&Point3::new(10.0, 10.0, 10.0), 0, 0.0, Filter::Trilinear), 4.0);
/// assert_eq!(grid.sample(&Point3::new(100.0, 10.0, 10.0), 0, 0.0, Filter::Nearest), 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct SparseHierarchicalVolume {
    attribute_count: usize,
    index_origin: Point3<f64>,
    spacing: Vector3<f64>,
    leaves: Vec<SparseLeaf>,
    tiles: Vec<SparseTile>,
    background: f64,
    filter: Filter,
    derived: Option<SparseDerived>,
}

impl SparseHierarchicalVolume {
    /// Creates an empty, uncommitted grid with `attribute_count` attributes.
    #[must_use]
    pub fn new(attribute_count: usize) -> Self {
        Self {
            attribute_count,
            index_origin: Point3::origin(),
            spacing: Vector3::new(1.0, 1.0, 1.0),
            leaves: Vec::new(),
            tiles: Vec::new(),
            background: f64::NAN,
            filter: Filter::default(),
            derived: None,
        }
    }

    /// Set the object-space position of voxel index zero.
    pub fn set_index_origin(&mut self, origin: Point3<f64>) {
        self.index_origin = origin;
        self.derived = None;
    }

    /// Set the object-space size of one voxel.
    pub fn set_spacing(&mut self, spacing: Vector3<f64>) {
        self.spacing = spacing;
        self.derived = None;
    }

    /// Add a dense leaf at a voxel `origin` aligned to [`LEAF_SIZE`].
    ///
    /// `data` holds one array of [`LEAF_VOXELS`] values per attribute.
    pub fn add_leaf(&mut self, origin: CellCoord, data: Vec<Vec<f64>>) {
        self.leaves.push(SparseLeaf { origin, data });
        self.derived = None;
    }

    /// Add a constant tile filling the node at `level` with the given voxel
    /// `origin`; `values` holds one value per attribute.
    pub fn add_tile(&mut self, level: usize, origin: CellCoord, values: Vec<f64>) {
        self.tiles.push(SparseTile {
            level,
            origin,
            values,
        });
        self.derived = None;
    }

    /// Set the value of inactive space.
    pub fn set_background(&mut self, background: f64) {
        self.background = background;
        self.derived = None;
    }

    /// Set the interpolation filter.
    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.derived = None;
    }

    /// The value of inactive space.
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

    /// Validate the node layout and build per-level node tables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a grid without attributes, bad
    /// spacing, misaligned or duplicated nodes, nodes inside a coarser tile,
    /// levels beyond the leaf level or data of the wrong length.
    pub fn commit(&mut self) -> Result<()> {
        self.derived = None;
        if self.attribute_count == 0 {
            return Err(VolumeError::invalid_config("volume has no attributes"));
        }
        let s = self.spacing;
        if !(s.iter().all(|v| v.is_finite() && *v > 0.0)) {
            return Err(VolumeError::InvalidSpacing {
                x: s.x,
                y: s.y,
                z: s.z,
            });
        }
        if self.leaves.is_empty() && self.tiles.is_empty() {
            return Err(VolumeError::invalid_config("sparse grid has no nodes"));
        }

        let mut levels: [HashMap<CellCoord, SparseNode>; LEVEL_COUNT] =
            std::array::from_fn(|_| HashMap::new());
        let mut placed: Vec<(usize, CellCoord)> =
            Vec::with_capacity(self.leaves.len() + self.tiles.len());

        for tile in &self.tiles {
            if tile.level >= LEVEL_COUNT {
                return Err(VolumeError::invalid_config(format!(
                    "tile level {} exceeds leaf level {LEAF_LEVEL}",
                    tile.level
                )));
            }
            if tile.values.len() != self.attribute_count {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: format!("tile at {:?}", tile.origin.as_array()),
                    expected: self.attribute_count,
                    actual: tile.values.len(),
                });
            }
            let ranges = tile.values.iter().map(|&v| ValueRange::point(v)).collect();
            let node = SparseNode {
                content: NodeContent::Tile(SmallVec::from_slice(&tile.values)),
                ranges,
            };
            let key = node_key(tile.level, tile.origin)?;
            if levels[tile.level].insert(key, node).is_some() {
                return Err(duplicate_node(tile.level, tile.origin));
            }
            placed.push((tile.level, key));
        }

        let leaf_ranges: Vec<Ranges> = self
            .leaves
            .par_iter()
            .map(|leaf| {
                leaf.data
                    .iter()
                    .map(|values| {
                        values.iter().fold(ValueRange::empty(), |mut acc, &v| {
                            acc.extend(v);
                            acc
                        })
                    })
                    .collect()
            })
            .collect();

        for (i, (leaf, ranges)) in self.leaves.iter().zip(leaf_ranges).enumerate() {
            if leaf.data.len() != self.attribute_count {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: format!("leaf at {:?}", leaf.origin.as_array()),
                    expected: self.attribute_count,
                    actual: leaf.data.len(),
                });
            }
            if let Some(values) = leaf.data.iter().find(|v| v.len() != LEAF_VOXELS) {
                return Err(VolumeError::AttributeSizeMismatch {
                    name: format!("leaf at {:?}", leaf.origin.as_array()),
                    expected: LEAF_VOXELS,
                    actual: values.len(),
                });
            }
            let key = node_key(LEAF_LEVEL, leaf.origin)?;
            let node = SparseNode {
                content: NodeContent::Leaf(i),
                ranges,
            };
            if levels[LEAF_LEVEL].insert(key, node).is_some() {
                return Err(duplicate_node(LEAF_LEVEL, leaf.origin));
            }
            placed.push((LEAF_LEVEL, key));
        }

        // Ancestors become internal nodes bounding their descendants.
        for &(level, key) in &placed {
            let ranges = levels[level][&key].ranges.clone();
            for ancestor_level in 0..level {
                let ancestor_key = key.shr(LEVEL_LOG2[ancestor_level] - LEVEL_LOG2[level]);
                let ancestor = levels[ancestor_level]
                    .entry(ancestor_key)
                    .or_insert_with(|| SparseNode {
                        content: NodeContent::Internal,
                        ranges: SmallVec::from_elem(ValueRange::empty(), self.attribute_count),
                    });
                if !matches!(ancestor.content, NodeContent::Internal) {
                    return Err(VolumeError::invalid_config(format!(
                        "node at level {level} lies inside a tile at level {ancestor_level}"
                    )));
                }
                for (a, r) in ancestor.ranges.iter_mut().zip(&ranges) {
                    a.extend_range(r);
                }
            }
        }

        let mut value_ranges: Vec<ValueRange> = vec![ValueRange::empty(); self.attribute_count];
        for node in levels[0].values() {
            for (acc, r) in value_ranges.iter_mut().zip(&node.ranges) {
                acc.extend_range(r);
            }
        }
        for range in &mut value_ranges {
            range.extend(self.background);
        }

        let dilated = self.dilate(&levels);
        for (level, updates) in dilated.into_iter().enumerate() {
            for (key, ranges) in updates {
                if let Some(node) = levels[level].get_mut(&key) {
                    node.ranges = ranges;
                }
            }
        }

        let mut root_min = CellCoord::splat(i32::MAX);
        let mut root_max = CellCoord::splat(i32::MIN);
        for key in levels[0].keys() {
            for axis in 0..3 {
                root_min = root_min.with_axis(axis, root_min[axis].min(key[axis]));
                root_max = root_max.with_axis(axis, root_max[axis].max(key[axis] + 1));
            }
        }

        let bounds = self
            .tiles
            .iter()
            .map(|t| (t.level, t.origin))
            .chain(self.leaves.iter().map(|l| (LEAF_LEVEL, l.origin)))
            .fold(Aabb::empty(), |acc, (level, origin)| {
                let extent = CellCoord::splat(1 << LEVEL_LOG2[level]);
                acc.union(&Aabb::new(
                    self.index_to_object(origin),
                    self.index_to_object(origin + extent),
                ))
            });

        debug!(
            leaves = self.leaves.len(),
            tiles = self.tiles.len(),
            nodes = levels.iter().map(HashMap::len).sum::<usize>(),
            attributes = self.attribute_count,
            "committed sparse hierarchical volume"
        );

        self.derived = Some(SparseDerived {
            levels,
            root_min,
            root_max,
            value_ranges,
            bounds,
        });
        Ok(())
    }

    /// Node ranges grown by the undilated ranges of their 26 neighbours.
    fn dilate(
        &self,
        levels: &[HashMap<CellCoord, SparseNode>; LEVEL_COUNT],
    ) -> Vec<Vec<(CellCoord, Ranges)>> {
        (0..LEVEL_COUNT)
            .map(|level| {
                let nodes: Vec<(&CellCoord, &SparseNode)> = levels[level].iter().collect();
                nodes
                    .into_par_iter()
                    .map(|(&key, node)| {
                        let mut ranges = node.ranges.clone();
                        if matches!(node.content, NodeContent::Internal) {
                            for r in &mut ranges {
                                r.extend(self.background);
                            }
                        }
                        for offset in NEIGHBOR_OFFSETS {
                            let neighbor = region_ranges(levels, level, key + offset);
                            for (a, r) in ranges.iter_mut().enumerate() {
                                match neighbor {
                                    Some(n) => r.extend_range(&n[a]),
                                    None => r.extend(self.background),
                                }
                            }
                        }
                        (key, ranges)
                    })
                    .collect()
            })
            .collect()
    }

    fn index_to_object(&self, index: CellCoord) -> Point3<f64> {
        let i = Vector3::from(index.as_array().map(f64::from));
        self.index_origin + i.component_mul(&self.spacing)
    }

    /// Value of one voxel; the background for inactive voxels.
    fn voxel_value(&self, voxel: CellCoord, attribute: usize) -> f64 {
        let Some(derived) = &self.derived else {
            return self.background;
        };
        for (level, nodes) in derived.levels.iter().enumerate() {
            let Some(node) = nodes.get(&voxel.shr(LEVEL_LOG2[level])) else {
                return self.background;
            };
            match &node.content {
                NodeContent::Internal => {}
                NodeContent::Tile(values) => return values[attribute],
                NodeContent::Leaf(i) => {
                    let leaf = &self.leaves[*i];
                    let local = voxel - leaf.origin;
                    #[allow(clippy::cast_sign_loss)]
                    let index = ((local.z as usize * LEAF_SIZE) + local.y as usize) * LEAF_SIZE
                        + local.x as usize;
                    return leaf.data[attribute][index];
                }
            }
        }
        self.background
    }

    /// Cell walk over the nodes of one level.
    pub(crate) fn walk(&self, ray: &Ray, level: usize) -> CellWalk {
        let level = level.min(LEAF_LEVEL);
        let cell_size = self.spacing * f64::from(1u32 << LEVEL_LOG2[level]);
        let Some(derived) = &self.derived else {
            let origin = CellCoord::splat(0);
            return CellWalk::new(ray, &self.index_origin, &cell_size, origin, origin);
        };
        let shift = LEVEL_LOG2[0] - LEVEL_LOG2[level];
        CellWalk::new(
            ray,
            &self.index_origin,
            &cell_size,
            derived.root_min.shl(shift),
            derived.root_max.shl(shift),
        )
    }

    /// Dilated value range over the node region `key` of `level`.
    ///
    /// Inactive regions yield the background, which is empty when NaN.
    pub(crate) fn region_range(&self, level: usize, key: CellCoord, attribute: usize) -> ValueRange {
        let mut range = ValueRange::empty();
        match self
            .derived
            .as_ref()
            .and_then(|d| region_ranges(&d.levels, level, key))
        {
            Some(ranges) => range.extend_range(&ranges[attribute]),
            None => range.extend(self.background),
        }
        range
    }
}

fn node_key(level: usize, origin: CellCoord) -> Result<CellCoord> {
    let log2 = LEVEL_LOG2[level];
    if origin.align_down(log2) != origin {
        return Err(VolumeError::invalid_config(format!(
            "node origin {:?} is not aligned to {} voxels at level {level}",
            origin.as_array(),
            1 << log2
        )));
    }
    Ok(origin.shr(log2))
}

fn duplicate_node(level: usize, origin: CellCoord) -> VolumeError {
    VolumeError::invalid_config(format!(
        "duplicate node at level {level} with origin {:?}",
        origin.as_array()
    ))
}

/// Ranges of whatever covers the region `key` of `level`: the node itself or
/// an enclosing tile. `None` for inactive regions.
fn region_ranges(
    levels: &[HashMap<CellCoord, SparseNode>; LEVEL_COUNT],
    level: usize,
    key: CellCoord,
) -> Option<&Ranges> {
    if let Some(node) = levels[level].get(&key) {
        return Some(&node.ranges);
    }
    for ancestor_level in (0..level).rev() {
        let ancestor_key = key.shr(LEVEL_LOG2[ancestor_level] - LEVEL_LOG2[level]);
        if let Some(node) = levels[ancestor_level].get(&ancestor_key) {
            return match node.content {
                NodeContent::Tile(_) => Some(&node.ranges),
                _ => None,
            };
        }
    }
    None
}

const NEIGHBOR_OFFSETS: [CellCoord; 26] = {
    let mut offsets = [CellCoord::splat(0); 26];
    let mut i = 0;
    let mut n = 0;
    while i < 27 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let c = CellCoord::new((i % 3) as i32 - 1, ((i / 3) % 3) as i32 - 1, (i / 9) as i32 - 1);
        if i != 13 {
            offsets[n] = c;
            n += 1;
        }
        i += 1;
    }
    offsets
};

impl VolumeKernel for SparseHierarchicalVolume {
    fn bounding_box(&self) -> Aabb {
        self.derived
            .as_ref()
            .map_or_else(Aabb::empty, |d| d.bounds)
    }

    fn attribute_count(&self) -> usize {
        self.attribute_count
    }

    fn value_range(&self, attribute: usize) -> ValueRange {
        self.derived
            .as_ref()
            .and_then(|d| d.value_ranges.get(attribute).copied())
            .unwrap_or_default()
    }

    fn sample(&self, point: &Point3<f64>, attribute: usize, _time: f64, filter: Filter) -> f64 {
        let index = (point - self.index_origin).component_div(&self.spacing);
        match filter {
            Filter::Nearest => self.voxel_value(floor_coord(&index), attribute),
            Filter::Trilinear => {
                let centred = index - Vector3::repeat(0.5);
                let base = floor_coord(&centred);
                let fraction = centred - Vector3::from(base.as_array().map(f64::from));
                let mut corners = [[[0.0; 2]; 2]; 2];
                for (dx, plane) in corners.iter_mut().enumerate() {
                    for (dy, row) in plane.iter_mut().enumerate() {
                        for (dz, value) in row.iter_mut().enumerate() {
                            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                            let offset = CellCoord::new(dx as i32, dy as i32, dz as i32);
                            *value = self.voxel_value(base + offset, attribute);
                        }
                    }
                }
                trilinear(&corners, &fraction)
            }
        }
    }

    fn nominal_cell_size(&self) -> f64 {
        self.spacing.min()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn floor_coord(index: &Vector3<f64>) -> CellCoord {
    CellCoord::new(
        index.x.floor() as i32,
        index.y.floor() as i32,
        index.z.floor() as i32,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Leaf whose voxel values equal their global x index.
    fn ramp_leaf(origin: CellCoord) -> Vec<Vec<f64>> {
        let mut data = Vec::with_capacity(LEAF_VOXELS);
        for _z in 0..LEAF_SIZE {
            for _y in 0..LEAF_SIZE {
                for x in 0..LEAF_SIZE {
                    data.push(f64::from(origin.x) + x as f64);
                }
            }
        }
        vec![data]
    }

    #[test]
    fn test_commit_validates_layout() {
        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_leaf(CellCoord::new(4, 0, 0), ramp_leaf(CellCoord::splat(0)));
        assert!(grid.commit().is_err_and(|e| e.is_config_error()));

        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_leaf(CellCoord::splat(0), ramp_leaf(CellCoord::splat(0)));
        grid.add_tile(3, CellCoord::splat(0), vec![1.0]);
        assert!(grid.commit().is_err());

        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_tile(2, CellCoord::splat(0), vec![1.0]);
        grid.add_leaf(CellCoord::new(8, 0, 0), ramp_leaf(CellCoord::new(8, 0, 0)));
        assert!(grid.commit().is_err());

        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_leaf(CellCoord::splat(0), vec![vec![0.0; 10]]);
        assert!(matches!(
            grid.commit(),
            Err(VolumeError::AttributeSizeMismatch { .. })
        ));

        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_tile(4, CellCoord::splat(0), vec![1.0]);
        assert!(grid.commit().is_err());
    }

    #[test]
    fn test_sample_leaf() {
        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_leaf(CellCoord::splat(0), ramp_leaf(CellCoord::splat(0)));
        grid.commit().unwrap();

        let p = Point3::new(3.0, 4.5, 4.5);
        assert_relative_eq!(grid.sample(&p, 0, 0.0, Filter::Trilinear), 2.5);
        assert_eq!(grid.sample(&Point3::new(3.7, 4.5, 4.5), 0, 0.0, Filter::Nearest), 3.0);
        assert!(grid.sample(&Point3::new(-3.0, 4.5, 4.5), 0, 0.0, Filter::Nearest).is_nan());
    }

    #[test]
    fn test_tiles_and_background() {
        let mut grid = SparseHierarchicalVolume::new(1);
        grid.set_background(-1.0);
        grid.set_spacing(Vector3::new(0.5, 0.5, 0.5));
        grid.add_tile(2, CellCoord::new(32, 0, 0), vec![7.0]);
        grid.add_leaf(CellCoord::splat(0), ramp_leaf(CellCoord::splat(0)));
        grid.commit().unwrap();

        assert_eq!(grid.sample(&Point3::new(20.25, 5.25, 5.25), 0, 0.0, Filter::Trilinear), 7.0);
        assert_eq!(grid.sample(&Point3::new(-50.0, 0.0, 0.0), 0, 0.0, Filter::Nearest), -1.0);
        assert_eq!(grid.value_range(0), ValueRange::new(-1.0, 7.0));
        assert_relative_eq!(grid.nominal_cell_size(), 0.5);
        assert_eq!(grid.bounding_box().max, Point3::new(32.0, 16.0, 16.0));
    }

    #[test]
    fn test_ranges_dilated_by_neighbors() {
        let mut grid = SparseHierarchicalVolume::new(1);
        grid.set_background(0.0);
        grid.add_leaf(CellCoord::splat(0), vec![vec![1.0; LEAF_VOXELS]]);
        grid.add_tile(3, CellCoord::new(8, 0, 0), vec![5.0]);
        grid.commit().unwrap();

        let leaf = grid.region_range(3, CellCoord::splat(0), 0);
        assert_eq!(leaf, ValueRange::new(0.0, 5.0));
        let far = grid.region_range(3, CellCoord::new(5, 5, 5), 0);
        assert_eq!(far, ValueRange::point(0.0));
        let root = grid.region_range(0, CellCoord::splat(0), 0);
        assert!(root.contains(5.0) && root.contains(0.0));
    }

    #[test]
    fn test_walk_level_nodes() {
        let mut grid = SparseHierarchicalVolume::new(1);
        grid.add_leaf(CellCoord::splat(0), vec![vec![1.0; LEAF_VOXELS]]);
        grid.commit().unwrap();

        let ray = Ray::new(Point3::new(-10.0, 4.0, 4.0), Vector3::x());
        let (key, span) = grid.walk(&ray, LEAF_LEVEL).next().unwrap();
        assert_eq!(key, CellCoord::splat(0));
        assert_relative_eq!(span.lower, 10.0);
        assert_relative_eq!(span.upper, 18.0);

        let (key, span) = grid.walk(&ray, 0).next().unwrap();
        assert_eq!(key, CellCoord::splat(0));
        assert_relative_eq!(span.upper, 522.0);
    }
}

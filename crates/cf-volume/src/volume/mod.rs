//! Volume representations.
//!
//! [`Volume`] is a closed set of representations sharing one evaluation
//! interface, [`VolumeKernel`]. Each variant is built through its own setters
//! and must be committed before it can be sampled or iterated; any setter
//! clears derived state.
//!
//! # Example
//!
//! ```
//! use cf_volume::{Attribute, StructuredRegularVolume, Volume, VolumeKind};
//!
//! let mut grid = StructuredRegularVolume::new([2, 2, 2]);
//! grid.add_attribute(Attribute::new("density", vec![1.0; 8]));
//!
//! let mut volume = Volume::from(grid);
//! assert!(!volume.is_committed());
//! volume.commit().unwrap();
//! assert_eq!(volume.kind(), VolumeKind::StructuredRegular);
//! assert_eq!(volume.attribute_count(), 1);
//! ```

mod amr;
pub(crate) mod kernel;
mod particle;
pub(crate) mod sparse;
mod spherical;
pub(crate) mod structured;
mod unstructured;

use rayon::prelude::*;

use crate::aabb::Aabb;
use crate::bvh::Bvh;
use crate::config::Filter;
use crate::depth::DepthMap;
use crate::error::{Result, VolumeError, check_attribute};
use crate::range::ValueRange;

pub use amr::{AmrBlock, AmrVolume};
pub use kernel::VolumeKernel;
pub use particle::{DEFAULT_RADIUS_SUPPORT_FACTOR, ParticleVolume};
pub use sparse::{LEAF_SIZE, LEAF_VOXELS, LEVEL_COUNT, SparseHierarchicalVolume};
pub use spherical::StructuredSphericalVolume;
pub use structured::{MACROCELL_SIZE, StructuredRegularVolume};
pub use unstructured::{Cell, Centering, UnstructuredVolume};

/// A named array of per-sample values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    /// Attribute name, used in error messages.
    pub name: String,
    /// Values in the representation's storage order.
    pub data: Vec<f64>,
}

impl Attribute {
    /// Creates an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Range of every non-NaN value.
    #[must_use]
    pub fn range(&self) -> ValueRange {
        self.data
            .par_iter()
            .fold(ValueRange::empty, |mut acc, &v| {
                acc.extend(v);
                acc
            })
            .reduce(ValueRange::empty, |a, b| a.union(&b))
    }
}

/// Discriminant of a [`Volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VolumeKind {
    /// Regular structured grid.
    StructuredRegular,
    /// Structured grid in spherical coordinates.
    StructuredSpherical,
    /// Unstructured mesh of tetrahedra and hexahedra.
    Unstructured,
    /// Adaptive mesh refinement blocks.
    Amr,
    /// Sparse hierarchical grid of leaves and tiles.
    SparseHierarchical,
    /// Gaussian particles.
    Particle,
}

impl VolumeKind {
    /// Whether the representation honours [`Filter`] settings.
    #[must_use]
    pub const fn supports_filter(self) -> bool {
        matches!(
            self,
            Self::StructuredRegular | Self::StructuredSpherical | Self::SparseHierarchical
        )
    }

    /// Whether interval traversal walks a bounding volume hierarchy.
    #[must_use]
    pub const fn uses_bvh(self) -> bool {
        matches!(self, Self::Unstructured | Self::Amr | Self::Particle)
    }
}

/// A volume of any supported representation.
#[derive(Debug, Clone)]
pub enum Volume {
    /// Regular structured grid.
    StructuredRegular(StructuredRegularVolume),
    /// Structured grid in spherical coordinates.
    StructuredSpherical(StructuredSphericalVolume),
    /// Unstructured mesh.
    Unstructured(UnstructuredVolume),
    /// Adaptive mesh refinement blocks.
    Amr(AmrVolume),
    /// Sparse hierarchical grid.
    SparseHierarchical(SparseHierarchicalVolume),
    /// Gaussian particles.
    Particle(ParticleVolume),
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Volume {
                fn from(volume: $ty) -> Self {
                    Self::$variant(volume)
                }
            }
        )*
    };
}

impl_from_variant!(
    StructuredRegular(StructuredRegularVolume),
    StructuredSpherical(StructuredSphericalVolume),
    Unstructured(UnstructuredVolume),
    Amr(AmrVolume),
    SparseHierarchical(SparseHierarchicalVolume),
    Particle(ParticleVolume),
);

impl Volume {
    /// The representation of this volume.
    #[must_use]
    pub const fn kind(&self) -> VolumeKind {
        match self {
            Self::StructuredRegular(_) => VolumeKind::StructuredRegular,
            Self::StructuredSpherical(_) => VolumeKind::StructuredSpherical,
            Self::Unstructured(_) => VolumeKind::Unstructured,
            Self::Amr(_) => VolumeKind::Amr,
            Self::SparseHierarchical(_) => VolumeKind::SparseHierarchical,
            Self::Particle(_) => VolumeKind::Particle,
        }
    }

    /// Validate parameters and build derived state.
    ///
    /// # Errors
    ///
    /// Returns the representation's configuration error; the volume stays
    /// uncommitted.
    pub fn commit(&mut self) -> Result<()> {
        match self {
            Self::StructuredRegular(v) => v.commit(),
            Self::StructuredSpherical(v) => v.commit(),
            Self::Unstructured(v) => v.commit(),
            Self::Amr(v) => v.commit(),
            Self::SparseHierarchical(v) => v.commit(),
            Self::Particle(v) => v.commit(),
        }
    }

    /// Whether derived state is current.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        match self {
            Self::StructuredRegular(v) => v.is_committed(),
            Self::StructuredSpherical(v) => v.is_committed(),
            Self::Unstructured(v) => v.is_committed(),
            Self::Amr(v) => v.is_committed(),
            Self::SparseHierarchical(v) => v.is_committed(),
            Self::Particle(v) => v.is_committed(),
        }
    }

    pub(crate) fn kernel(&self) -> &dyn VolumeKernel {
        match self {
            Self::StructuredRegular(v) => v,
            Self::StructuredSpherical(v) => v,
            Self::Unstructured(v) => v,
            Self::Amr(v) => v,
            Self::SparseHierarchical(v) => v,
            Self::Particle(v) => v,
        }
    }

    /// Fails with [`VolumeError::NotCommitted`] unless committed.
    pub(crate) fn ensure_committed(&self) -> Result<()> {
        if self.is_committed() {
            Ok(())
        } else {
            Err(VolumeError::NotCommitted { object: "volume" })
        }
    }

    /// Number of attributes.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.kernel().attribute_count()
    }

    /// Bounding box of the volume's support.
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        self.kernel().bounding_box()
    }

    /// Value range of one attribute over the whole volume.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotCommitted`] or
    /// [`VolumeError::InvalidAttributeIndex`].
    pub fn value_range(&self, attribute: usize) -> Result<ValueRange> {
        self.ensure_committed()?;
        check_attribute(attribute, self.attribute_count())?;
        Ok(self.kernel().value_range(attribute))
    }

    /// The volume's own filter; trilinear for representations without one.
    #[must_use]
    pub const fn filter(&self) -> Filter {
        match self {
            Self::StructuredRegular(v) => v.filter(),
            Self::StructuredSpherical(v) => v.filter(),
            Self::SparseHierarchical(v) => v.filter(),
            Self::Unstructured(_) | Self::Amr(_) | Self::Particle(_) => Filter::Trilinear,
        }
    }

    /// Value outside the support; NaN when undefined or when the
    /// representation has none.
    #[must_use]
    pub const fn background(&self) -> f64 {
        match self {
            Self::StructuredRegular(v) => v.background(),
            Self::StructuredSpherical(v) => v.background(),
            Self::Unstructured(v) => v.background(),
            Self::Amr(v) => v.background(),
            Self::SparseHierarchical(v) => v.background(),
            Self::Particle(_) => f64::NAN,
        }
    }

    pub(crate) fn bvh(&self) -> Option<&Bvh> {
        match self {
            Self::Unstructured(v) => v.bvh(),
            Self::Amr(v) => v.bvh(),
            Self::Particle(v) => v.bvh(),
            _ => None,
        }
    }

    /// Deepest traversal depth: the BVH depth, 3 for sparse hierarchical
    /// grids and 0 for structured grids.
    #[must_use]
    pub fn hierarchy_depth(&self) -> u32 {
        match self {
            Self::SparseHierarchical(_) => DepthMap::sparse().max_depth(),
            _ => self.bvh().map_or(0, Bvh::depth),
        }
    }

    /// The resolution-hint table of this representation.
    #[must_use]
    pub fn depth_map(&self) -> DepthMap {
        match self.kind() {
            VolumeKind::SparseHierarchical => DepthMap::sparse(),
            VolumeKind::StructuredRegular | VolumeKind::StructuredSpherical => DepthMap::flat(),
            VolumeKind::Unstructured | VolumeKind::Amr | VolumeKind::Particle => {
                DepthMap::bvh(self.hierarchy_depth())
            }
        }
    }
}

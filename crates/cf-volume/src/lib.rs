//! Volume sampling and ray interval/isosurface iteration for CortenForge.
//!
//! This crate evaluates scalar fields stored in several volume representations
//! and walks rays through them:
//!
//! - [`Volume`] - structured regular and spherical grids, unstructured meshes,
//!   AMR blocks, sparse hierarchical grids and Gaussian particles
//! - [`Sampler`] - point values and gradients, scalar, streamed and lane-batched
//! - [`IntervalIteratorContext`] / [`IntervalIterator`] - ray segments with
//!   value bounds, for empty-space skipping and adaptive ray marching
//! - [`HitIteratorContext`] / [`HitIterator`] - isosurface crossings along rays
//! - [`DepthMap`] - mapping of the interval resolution hint to a traversal depth
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. Volumes, samplers
//! and contexts are plain values; iterators are fixed-size and are created
//! into caller-owned storage.
//!
//! # Lifecycle
//!
//! Every object follows the same protocol: set parameters, `commit`, then use.
//! A committed [`Volume`] is shared as `Arc<Volume>` and never changes.
//! Contexts publish an immutable snapshot on each commit, and iterators keep
//! the snapshot they were created with.
//!
//! # Lane Widths
//!
//! Lane-batched entry points are generic over `const W: usize` but only the
//! build's [`NATIVE_WIDTH`] is accepted; see [`LaneWidth`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cf_volume::{
//!     Attribute, HitIteratorContext, Ray, Sampler, StructuredRegularVolume, Volume,
//! };
//! use nalgebra::{Point3, Vector3};
//!
//! // 17³ vertices over [0, 1]³ holding f(x, y, z) = z.
//! let n = 17;
//! let mut data = Vec::with_capacity(n * n * n);
//! for z in 0..n {
//!     for _ in 0..n * n {
//!         data.push(z as f64 / (n - 1) as f64);
//!     }
//! }
//! let mut grid = StructuredRegularVolume::new([n, n, n]);
//! grid.set_grid_spacing(Vector3::repeat(1.0 / (n - 1) as f64));
//! grid.add_attribute(Attribute::new("z", data));
//!
//! let mut volume = Volume::from(grid);
//! volume.commit().unwrap();
//! let sampler = Sampler::new(Arc::new(volume)).unwrap();
//!
//! let mut context = HitIteratorContext::new(sampler);
//! context.set_values(vec![0.25, 0.75]);
//! context.commit().unwrap();
//!
//! let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
//! let mut slot = None;
//! let iterator = context.init_iterator(&mut slot, &ray, 0.0).unwrap();
//! let hits: Vec<_> = iterator.collect();
//!
//! assert_eq!(hits.len(), 2);
//! assert!((hits[0].t - 1.25).abs() <= hits[0].epsilon);
//! assert!((hits[1].t - 1.75).abs() <= hits[1].epsilon);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod aabb;
mod bvh;
mod config;
mod context;
mod coord;
mod depth;
mod dispatch;
mod error;
mod iterator;
mod lanes;
mod range;
mod ray;
mod sampler;
mod volume;

// Re-export core types
pub use aabb::Aabb;
pub use bvh::{Bvh, BvhNode, NodeKind, RangeCombine};
pub use config::{BvhConfig, Filter, HitContextConfig, IntervalContextConfig, SamplerConfig};
pub use context::{HitIteratorContext, IntervalIteratorContext};
pub use coord::CellCoord;
pub use depth::DepthMap;
pub use dispatch::{LaneWidth, NATIVE_WIDTH, hit_iterator_size, interval_iterator_size};
pub use error::{Result, VolumeError};
pub use iterator::{
    Hit, HitIterator, HitIteratorN, HitN, Interval, IntervalIterator, IntervalIteratorN,
    IntervalN,
};
pub use lanes::{LaneMask, RayN, Vec3xN, all_lanes};
pub use range::ValueRange;
pub use ray::{CellWalk, Ray};
pub use sampler::Sampler;
pub use volume::{
    AmrBlock, AmrVolume, Attribute, Cell, Centering, DEFAULT_RADIUS_SUPPORT_FACTOR, LEAF_SIZE,
    LEAF_VOXELS, LEVEL_COUNT, MACROCELL_SIZE, ParticleVolume, SparseHierarchicalVolume,
    StructuredRegularVolume, StructuredSphericalVolume, UnstructuredVolume, Volume, VolumeKernel,
    VolumeKind,
};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

//! Per-representation traversal of a ray through a volume's acceleration
//! structure.
//!
//! A [`Traversal`] yields raw intervals in increasing `t` without applying
//! the context's value-range filter. It holds no heap data, only a
//! representation-specific cursor. BVH volumes keep a bounded frontier of
//! pending nodes so each node is expanded at most once per ray.

use crate::bvh::BvhSweep;
use crate::context::IntervalState;
use crate::range::ValueRange;
use crate::ray::{CellWalk, Ray};
use crate::volume::structured::MACROCELL_SIZE;
use crate::volume::{Volume, VolumeKernel};

use super::Interval;

/// Segment length of spherical grids, in nominal cells.
#[allow(clippy::cast_precision_loss)]
const SEGMENT_CELLS: f64 = MACROCELL_SIZE as f64;

#[derive(Debug, Clone, Copy)]
#[allow(clippy::large_enum_variant)]
pub(crate) enum TraversalState {
    /// Macro-cells or elementary cells of a regular grid.
    Grid { walk: CellWalk },
    /// Uniform segments bounded by the whole-volume value range.
    Segments { t: f64, end: f64, step: f64 },
    /// Non-overlapping spans of a BVH cut, swept front to back.
    Bvh { sweep: BvhSweep },
    /// Nodes of one level of a sparse hierarchical grid.
    Sparse { walk: CellWalk, level: usize },
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Traversal {
    ray: Ray,
    time: f64,
    nominal_delta_t: f64,
    state: TraversalState,
}

impl Traversal {
    pub(crate) fn new(context: &IntervalState, ray: &Ray, time: f64) -> Self {
        let volume = context.sampler.volume();
        let kernel = volume.kernel();
        let empty = Self {
            ray: *ray,
            time,
            nominal_delta_t: 0.0,
            state: TraversalState::Empty,
        };
        if !ray.is_valid() {
            return empty;
        }
        let Some(span) = ray.clip(&kernel.bounding_box()) else {
            return empty;
        };
        if span.upper <= span.lower {
            return empty;
        }
        let clipped = ray.with_t_range(span);

        let state = match &**volume {
            Volume::StructuredRegular(grid) => TraversalState::Grid {
                walk: grid.walk(&clipped, context.elementary),
            },
            Volume::StructuredSpherical(_) => {
                let cells = if context.elementary { 1.0 } else { SEGMENT_CELLS };
                TraversalState::Segments {
                    t: span.lower,
                    end: span.upper,
                    step: ray.delta_t(cells * kernel.nominal_cell_size()),
                }
            }
            Volume::Unstructured(_) | Volume::Amr(_) | Volume::Particle(_) => {
                volume.bvh().map_or(TraversalState::Empty, |bvh| TraversalState::Bvh {
                    sweep: BvhSweep::new(bvh, &clipped, context.depth, context.attribute),
                })
            }
            Volume::SparseHierarchical(sparse) => {
                let level = context.depth as usize;
                TraversalState::Sparse {
                    walk: sparse.walk(&clipped, level),
                    level,
                }
            }
        };

        Self {
            ray: clipped,
            time,
            nominal_delta_t: ray.delta_t(kernel.nominal_cell_size()),
            state,
        }
    }

    pub(crate) const fn ray(&self) -> &Ray {
        &self.ray
    }

    pub(crate) const fn time(&self) -> f64 {
        self.time
    }

    /// Next region along the ray, or `None` once exhausted.
    pub(crate) fn next_region(&mut self, context: &IntervalState) -> Option<Interval> {
        let volume = context.sampler.volume();
        let attribute = context.attribute;
        let interval = match (&mut self.state, &**volume) {
            (TraversalState::Grid { walk }, Volume::StructuredRegular(grid)) => {
                let (coord, t_range) = walk.next()?;
                let value_range = if context.elementary {
                    grid.cell_range(coord, attribute, self.time)
                } else {
                    grid.macrocell_range(coord, attribute)
                };
                Interval {
                    t_range,
                    value_range,
                    nominal_delta_t: self.nominal_delta_t,
                    depth: 0,
                }
            }
            (TraversalState::Segments { t, end, step }, Volume::StructuredSpherical(grid)) => {
                if *t >= *end {
                    return None;
                }
                let lower = *t;
                let upper = if step.is_finite() && *step > 0.0 {
                    (lower + *step).min(*end)
                } else {
                    *end
                };
                *t = upper;
                Interval {
                    t_range: ValueRange { lower, upper },
                    value_range: grid.value_range(attribute),
                    nominal_delta_t: self.nominal_delta_t,
                    depth: 0,
                }
            }
            (TraversalState::Bvh { sweep }, _) => {
                let bvh = volume.bvh()?;
                let span = sweep.next_span(bvh, &self.ray)?;
                let mut value_range = span.value_range;
                value_range.extend(volume.background());
                Interval {
                    t_range: span.t_range,
                    value_range,
                    nominal_delta_t: self.ray.delta_t(span.nominal_size),
                    depth: context.depth.min(bvh.depth()),
                }
            }
            (TraversalState::Sparse { walk, level }, Volume::SparseHierarchical(sparse)) => {
                let level = *level;
                let (t_range, value_range) = walk.find_map(|(key, t_range)| {
                    let range = sparse.region_range(level, key, attribute);
                    (!range.is_empty()).then_some((t_range, range))
                })?;
                #[allow(clippy::cast_possible_truncation)]
                let depth = level as u32;
                Interval {
                    t_range,
                    value_range,
                    nominal_delta_t: self.nominal_delta_t,
                    depth,
                }
            }
            _ => return None,
        };
        Some(interval)
    }
}

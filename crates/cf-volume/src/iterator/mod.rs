//! Ray interval and isosurface hit iteration.
//!
//! Iterators are created from a committed context and hold a snapshot of it,
//! so a context may be re-committed while iterators created earlier keep
//! running on the state they were created with.
//!
//! - [`IntervalIterator`] yields [`Interval`]s: contiguous, non-overlapping
//!   ray segments in increasing `t` with a bound on the attribute's values.
//! - [`HitIterator`] yields [`Hit`]s: ray parameters where the attribute
//!   crosses one of the context's isovalues.
//!
//! Both have lane-batched forms ([`IntervalIteratorN`], [`HitIteratorN`])
//! that advance `W` rays under a validity mask.

mod hit;
mod interval;
pub(crate) mod traversal;

pub use hit::{HitIterator, HitIteratorN};
pub use interval::{IntervalIterator, IntervalIteratorN};

use crate::range::ValueRange;

/// A segment of a ray with a bound on the attribute's values over it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// Ray parameters `[lower, upper)` covered by the interval.
    pub t_range: ValueRange,
    /// Conservative bound on the attribute's values inside the interval.
    pub value_range: ValueRange,
    /// Ray parameter length of the finest cell crossed.
    pub nominal_delta_t: f64,
    /// Traversal depth the interval was produced at; 0 for structured grids.
    pub depth: u32,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            t_range: ValueRange::empty(),
            value_range: ValueRange::empty(),
            nominal_delta_t: 0.0,
            depth: 0,
        }
    }
}

/// An isosurface crossing along a ray.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hit {
    /// Ray parameter of the crossing.
    pub t: f64,
    /// The isovalue crossed.
    pub sample: f64,
    /// Ray parameter tolerance of `t`; always positive.
    pub epsilon: f64,
    /// Attribute the isovalue belongs to.
    pub attribute_index: usize,
}

/// Intervals of `W` lanes, one array per field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalN<const W: usize> {
    /// Lower ray parameters.
    pub t_lower: [f64; W],
    /// Upper ray parameters.
    pub t_upper: [f64; W],
    /// Lower value bounds.
    pub value_lower: [f64; W],
    /// Upper value bounds.
    pub value_upper: [f64; W],
    /// Nominal cell lengths along each ray.
    pub nominal_delta_t: [f64; W],
    /// Traversal depths.
    pub depth: [u32; W],
}

impl<const W: usize> Default for IntervalN<W> {
    fn default() -> Self {
        Self {
            t_lower: [0.0; W],
            t_upper: [0.0; W],
            value_lower: [0.0; W],
            value_upper: [0.0; W],
            nominal_delta_t: [0.0; W],
            depth: [0; W],
        }
    }
}

impl<const W: usize> IntervalN<W> {
    /// Writes one lane.
    pub fn set(&mut self, lane: usize, interval: &Interval) {
        self.t_lower[lane] = interval.t_range.lower;
        self.t_upper[lane] = interval.t_range.upper;
        self.value_lower[lane] = interval.value_range.lower;
        self.value_upper[lane] = interval.value_range.upper;
        self.nominal_delta_t[lane] = interval.nominal_delta_t;
        self.depth[lane] = interval.depth;
    }

    /// Reads one lane.
    #[must_use]
    pub fn get(&self, lane: usize) -> Interval {
        Interval {
            t_range: ValueRange {
                lower: self.t_lower[lane],
                upper: self.t_upper[lane],
            },
            value_range: ValueRange {
                lower: self.value_lower[lane],
                upper: self.value_upper[lane],
            },
            nominal_delta_t: self.nominal_delta_t[lane],
            depth: self.depth[lane],
        }
    }
}

/// Hits of `W` lanes, one array per field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitN<const W: usize> {
    /// Ray parameters.
    pub t: [f64; W],
    /// Isovalues crossed.
    pub sample: [f64; W],
    /// Ray parameter tolerances.
    pub epsilon: [f64; W],
    /// Attribute indices.
    pub attribute_index: [usize; W],
}

impl<const W: usize> Default for HitN<W> {
    fn default() -> Self {
        Self {
            t: [0.0; W],
            sample: [0.0; W],
            epsilon: [0.0; W],
            attribute_index: [0; W],
        }
    }
}

impl<const W: usize> HitN<W> {
    /// Writes one lane.
    pub fn set(&mut self, lane: usize, hit: &Hit) {
        self.t[lane] = hit.t;
        self.sample[lane] = hit.sample;
        self.epsilon[lane] = hit.epsilon;
        self.attribute_index[lane] = hit.attribute_index;
    }

    /// Reads one lane.
    #[must_use]
    pub fn get(&self, lane: usize) -> Hit {
        Hit {
            t: self.t[lane],
            sample: self.sample[lane],
            epsilon: self.epsilon[lane],
            attribute_index: self.attribute_index[lane],
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_set_get() {
        let interval = Interval {
            t_range: ValueRange::new(1.0, 2.0),
            value_range: ValueRange::new(-1.0, 3.0),
            nominal_delta_t: 0.25,
            depth: 2,
        };
        let mut lanes = IntervalN::<4>::default();
        lanes.set(2, &interval);
        assert_eq!(lanes.get(2), interval);
        assert_eq!(lanes.t_upper[1], 0.0);

        let hit = Hit {
            t: 1.5,
            sample: 0.5,
            epsilon: 0.01,
            attribute_index: 1,
        };
        let mut hits = HitN::<4>::default();
        hits.set(0, &hit);
        assert_eq!(hits.get(0), hit);
        assert_eq!(hits.t[3], 0.0);
    }
}

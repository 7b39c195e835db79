use std::iter::FusedIterator;
use std::sync::Arc;

use crate::context::IntervalState;
use crate::dispatch::check_native;
use crate::error::Result;
use crate::lanes::{LaneMask, RayN};
use crate::ray::Ray;

use super::traversal::Traversal;
use super::{Interval, IntervalN};

/// Iterates the intervals of one ray.
///
/// Intervals come in strictly increasing, non-overlapping order, confined to
/// the ray's `t_range`, and only where their value bound overlaps one of the
/// context's value ranges.
#[derive(Debug, Clone)]
pub struct IntervalIterator {
    context: Arc<IntervalState>,
    traversal: Traversal,
    exhausted: bool,
}

impl IntervalIterator {
    pub(crate) fn new(context: Arc<IntervalState>, ray: &Ray, time: f64) -> Self {
        let traversal = Traversal::new(&context, ray, time);
        Self {
            context,
            traversal,
            exhausted: false,
        }
    }

    /// Writes the next interval to `out`; returns false once exhausted, in
    /// which case `out` is left untouched.
    pub fn iterate(&mut self, out: &mut Interval) -> bool {
        match self.next() {
            Some(interval) => {
                *out = interval;
                true
            }
            None => false,
        }
    }

    /// The ray clipped to the volume's bounds.
    #[must_use]
    pub const fn ray(&self) -> &Ray {
        self.traversal.ray()
    }

    /// The time the iterator samples at.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.traversal.time()
    }

    /// Whether iteration has finished.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Iterator for IntervalIterator {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if self.exhausted {
            return None;
        }
        while let Some(interval) = self.traversal.next_region(&self.context) {
            if self.context.accepts(&interval.value_range) {
                return Some(interval);
            }
        }
        self.exhausted = true;
        None
    }
}

impl FusedIterator for IntervalIterator {}

/// Iterates the intervals of `W` rays at once.
#[derive(Debug, Clone)]
pub struct IntervalIteratorN<const W: usize> {
    lanes: [Option<IntervalIterator>; W],
}

impl<const W: usize> IntervalIteratorN<W> {
    pub(crate) fn new(
        context: &Arc<IntervalState>,
        valid: &LaneMask<W>,
        rays: &RayN<W>,
        times: &[f64; W],
    ) -> Self {
        Self {
            lanes: std::array::from_fn(|lane| {
                valid[lane].then(|| {
                    IntervalIterator::new(Arc::clone(context), &rays.ray(lane), times[lane])
                })
            }),
        }
    }

    /// Advances every lane in `valid`.
    ///
    /// `result[lane]` is true where an interval was written to `out`. Lanes
    /// whose iteration has finished report false and keep their previous
    /// output. Lanes outside `valid` leave both `out` and `result` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VolumeError::Unsupported`] unless `W` is the native
    /// width.
    pub fn iterate(
        &mut self,
        valid: &LaneMask<W>,
        out: &mut IntervalN<W>,
        result: &mut [bool; W],
    ) -> Result<()> {
        check_native::<W>("interval iteration")?;
        for (lane, iterator) in self.lanes.iter_mut().enumerate() {
            if !valid[lane] {
                continue;
            }
            result[lane] = match iterator.as_mut().and_then(Iterator::next) {
                Some(interval) => {
                    out.set(lane, &interval);
                    true
                }
                None => false,
            };
        }
        Ok(())
    }
}

use std::iter::FusedIterator;
use std::sync::Arc;

use crate::context::HitState;
use crate::dispatch::check_native;
use crate::error::Result;
use crate::lanes::{LaneMask, RayN};
use crate::ray::Ray;

use super::traversal::Traversal;
use super::{Hit, HitN, Interval};

/// Bisection steps refining a crossing before the final linear estimate.
const BISECTION_STEPS: usize = 12;

/// Fraction of the nominal step used as hit tolerance.
const EPSILON_FRACTION: f64 = 0.125;

/// Iterates the isosurface crossings of one ray.
///
/// Inside each interval whose value bound contains an isovalue, the field is
/// sampled every `nominal_delta_t`. A step whose endpoints lie strictly on
/// different sides of an isovalue is refined by bisection. A sample equal to
/// an isovalue is a hit at that sample, reported once per run of equal
/// samples, including at the ray entry or the start of its `t_range`.
/// Crossings come in increasing `t`, ties broken by isovalue.
#[derive(Debug, Clone)]
pub struct HitIterator {
    context: Arc<HitState>,
    traversal: Traversal,
    /// Interval being scanned.
    current: Option<Interval>,
    /// Start of the current step and the value there.
    t_a: f64,
    f_a: f64,
    /// Last crossing emitted within the current step.
    last: Option<(f64, usize)>,
    /// End of the last interval scanned.
    scanned_end: Option<f64>,
    /// Whether `t_a` opens a run not continued from a scanned interval.
    at_start: bool,
    exhausted: bool,
}

impl HitIterator {
    pub(crate) fn new(context: Arc<HitState>, ray: &Ray, time: f64) -> Self {
        let traversal = Traversal::new(&context.intervals, ray, time);
        let exhausted = context.values.is_empty();
        Self {
            context,
            traversal,
            current: None,
            t_a: 0.0,
            f_a: f64::NAN,
            last: None,
            scanned_end: None,
            at_start: false,
            exhausted,
        }
    }

    /// Writes the next hit to `out`; returns false once exhausted, in which
    /// case `out` is left untouched.
    pub fn iterate(&mut self, out: &mut Hit) -> bool {
        match self.next() {
            Some(hit) => {
                *out = hit;
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

    /// Whether iteration has finished.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn sample_at(&self, t: f64) -> f64 {
        let state = &self.context.intervals;
        let point = self.traversal.ray().point_at(t);
        state
            .sampler
            .sample_unchecked(&point, state.attribute, self.traversal.time())
    }

    /// Next interval whose value bound contains at least one isovalue.
    fn next_interval(&mut self) -> Option<Interval> {
        while let Some(interval) = self.traversal.next_region(&self.context.intervals) {
            let range = interval.value_range;
            if self.context.values.iter().any(|&v| range.contains(v)) {
                return Some(interval);
            }
        }
        None
    }

    /// Crossing of `value` within the step ending at `(t_b, f_b)`.
    #[allow(clippy::float_cmp)]
    fn crossing(&self, value: f64, t_b: f64, f_b: f64) -> Option<f64> {
        let f_a = self.f_a;
        if f_a == value {
            // Touching at the step start was reported by the previous step.
            return self.at_start.then_some(self.t_a);
        }
        if f_b == value {
            return Some(t_b);
        }
        let straddles = (f_a < value && f_b > value) || (f_a > value && f_b < value);
        straddles.then(|| self.refine(value, (self.t_a, f_a), (t_b, f_b)))
    }

    /// Crossing of `value` between `(t0, f0)` and `(t1, f1)`, whose values lie
    /// on different sides of it.
    fn refine(&self, value: f64, (mut t0, mut f0): (f64, f64), (mut t1, mut f1): (f64, f64)) -> f64 {
        let above0 = f0 >= value;
        for _ in 0..BISECTION_STEPS {
            let tm = 0.5 * (t0 + t1);
            let fm = self.sample_at(tm);
            if fm.is_nan() {
                break;
            }
            if (fm >= value) == above0 {
                t0 = tm;
                f0 = fm;
            } else {
                t1 = tm;
                f1 = fm;
            }
        }
        let df = f1 - f0;
        if df.abs() > 0.0 {
            ((value - f0) / df).clamp(0.0, 1.0).mul_add(t1 - t0, t0)
        } else {
            0.5 * (t0 + t1)
        }
    }
}

impl Iterator for HitIterator {
    type Item = Hit;

    fn next(&mut self) -> Option<Hit> {
        while !self.exhausted {
            let interval = match self.current {
                Some(interval) => interval,
                None => {
                    let Some(interval) = self.next_interval() else {
                        self.exhausted = true;
                        break;
                    };
                    self.current = Some(interval);
                    self.at_start = self.scanned_end != Some(interval.t_range.lower);
                    self.scanned_end = Some(interval.t_range.upper);
                    self.t_a = interval.t_range.lower;
                    self.f_a = self.sample_at(self.t_a);
                    self.last = None;
                    interval
                }
            };

            let length = interval.t_range.width();
            let step = if interval.nominal_delta_t.is_finite() && interval.nominal_delta_t > 0.0 {
                interval.nominal_delta_t
            } else {
                length
            };
            let t_b = (self.t_a + step).min(interval.t_range.upper);
            let f_b = self.sample_at(t_b);

            let mut best: Option<(f64, usize)> = None;
            if !self.f_a.is_nan() && !f_b.is_nan() {
                for (index, &value) in self.context.values.iter().enumerate() {
                    if !interval.value_range.contains(value) {
                        continue;
                    }
                    let Some(t) = self.crossing(value, t_b, f_b) else {
                        continue;
                    };
                    let after_last = self
                        .last
                        .is_none_or(|(lt, li)| t > lt || (t >= lt && index > li));
                    let before_best = best.is_none_or(|(bt, _)| t < bt);
                    if after_last && before_best {
                        best = Some((t, index));
                    }
                }
            }

            if let Some((t, index)) = best {
                self.last = best;
                let epsilon = (EPSILON_FRACTION * interval.nominal_delta_t)
                    .max(f64::EPSILON * t.abs().max(1.0));
                return Some(Hit {
                    t,
                    sample: self.context.values[index],
                    epsilon,
                    attribute_index: self.context.intervals.attribute,
                });
            }

            if t_b >= interval.t_range.upper {
                self.current = None;
            } else {
                self.t_a = t_b;
                self.f_a = f_b;
                self.last = None;
                self.at_start = false;
            }
        }
        None
    }
}

impl FusedIterator for HitIterator {}

/// Iterates the isosurface crossings of `W` rays at once.
#[derive(Debug, Clone)]
pub struct HitIteratorN<const W: usize> {
    lanes: [Option<HitIterator>; W],
}

impl<const W: usize> HitIteratorN<W> {
    pub(crate) fn new(
        context: &Arc<HitState>,
        valid: &LaneMask<W>,
        rays: &RayN<W>,
        times: &[f64; W],
    ) -> Self {
        Self {
            lanes: std::array::from_fn(|lane| {
                valid[lane]
                    .then(|| HitIterator::new(Arc::clone(context), &rays.ray(lane), times[lane]))
            }),
        }
    }

    /// Advances every lane in `valid`.
    ///
    /// `result[lane]` is true where a hit was written to `out`. Lanes whose
    /// iteration has finished report false and keep their previous output.
    /// Lanes outside `valid` leave both `out` and `result` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VolumeError::Unsupported`] unless `W` is the native
    /// width.
    pub fn iterate(
        &mut self,
        valid: &LaneMask<W>,
        out: &mut HitN<W>,
        result: &mut [bool; W],
    ) -> Result<()> {
        check_native::<W>("hit iteration")?;
        for (lane, iterator) in self.lanes.iter_mut().enumerate() {
            if !valid[lane] {
                continue;
            }
            result[lane] = match iterator.as_mut().and_then(Iterator::next) {
                Some(hit) => {
                    out.set(lane, &hit);
                    true
                }
                None => false,
            };
        }
        Ok(())
    }
}

//! Iterator contexts.
//!
//! A context binds a [`Sampler`] to iteration parameters. Setters only change
//! the pending configuration; [`IntervalIteratorContext::commit`] and
//! [`HitIteratorContext::commit`] validate it and publish an immutable
//! snapshot. Iterators share the snapshot current at their creation, so
//! re-committing never affects iterators that already exist.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cf_volume::{
//!     Attribute, IntervalIteratorContext, Ray, Sampler, StructuredRegularVolume, Volume,
//! };
//! use nalgebra::{Point3, Vector3};
//!
//! let mut grid = StructuredRegularVolume::new([2, 2, 2]);
//! grid.add_attribute(Attribute::new("f", vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]));
//! let mut volume = Volume::from(grid);
//! volume.commit().unwrap();
//!
//! let mut context = IntervalIteratorContext::new(Sampler::new(Arc::new(volume)).unwrap());
//! context.commit().unwrap();
//!
//! let ray = Ray::new(Point3::new(0.5, 0.5, -1.0), Vector3::z());
//! let intervals: Vec<_> = context.iterator(&ray, 0.0).unwrap().collect();
//! assert_eq!(intervals.len(), 1);
//! assert!((intervals[0].t_range.lower - 1.0).abs() < 1e-12);
//! assert!((intervals[0].t_range.upper - 2.0).abs() < 1e-12);
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{HitContextConfig, IntervalContextConfig};
use crate::dispatch::{LaneWidth, check_native, hit_iterator_size, interval_iterator_size};
use crate::error::{Result, VolumeError, check_time};
use crate::iterator::{HitIterator, HitIteratorN, IntervalIterator, IntervalIteratorN};
use crate::lanes::{LaneMask, RayN};
use crate::range::ValueRange;
use crate::ray::Ray;
use crate::sampler::Sampler;
use crate::volume::VolumeKind;

/// Resolution hint of hit iteration over sparse hierarchical grids.
const SPARSE_HIT_RESOLUTION: f64 = 1.0;

/// Resolution hint of hit iteration over every other representation.
const DEFAULT_HIT_RESOLUTION: f64 = 0.5;

/// Committed interval iteration parameters.
#[derive(Debug)]
pub(crate) struct IntervalState {
    pub sampler: Sampler,
    pub attribute: usize,
    /// Sorted, disjoint; empty accepts every value.
    pub value_ranges: Vec<ValueRange>,
    pub depth: u32,
    pub elementary: bool,
}

impl IntervalState {
    fn new(sampler: Sampler, attribute: usize, value_ranges: Vec<ValueRange>, hint: f64) -> Self {
        let depth = sampler.volume().depth_map().map(hint);
        #[allow(clippy::float_cmp)]
        let elementary = hint == 1.0;
        Self {
            sampler,
            attribute,
            value_ranges,
            depth,
            elementary,
        }
    }

    /// Whether an interval with this value bound is of interest.
    pub(crate) fn accepts(&self, range: &ValueRange) -> bool {
        self.value_ranges.is_empty() || self.value_ranges.iter().any(|r| r.overlaps(range))
    }
}

/// Committed hit iteration parameters.
#[derive(Debug)]
pub(crate) struct HitState {
    pub intervals: IntervalState,
    /// Sorted, unique, never NaN.
    pub values: Vec<f64>,
}

fn clamp_hint(hint: f64) -> f64 {
    let clamped = hint.clamp(0.0, 1.0);
    #[allow(clippy::float_cmp)]
    let changed = clamped != hint;
    if changed {
        warn!(hint, clamped, "interval resolution hint clamped to [0, 1]");
    }
    clamped
}

/// Sorts ranges and merges overlapping ones.
fn merge_ranges(ranges: &[ValueRange]) -> Vec<ValueRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by(|a, b| a.lower.total_cmp(&b.lower));
    let mut merged: Vec<ValueRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.lower <= last.upper => last.upper = last.upper.max(range.upper),
            _ => merged.push(range),
        }
    }
    if merged.len() != ranges.len() {
        warn!(
            given = ranges.len(),
            merged = merged.len(),
            "overlapping value ranges merged"
        );
    }
    merged
}

fn not_committed(object: &'static str) -> VolumeError {
    VolumeError::NotCommitted { object }
}

/// Parameters for interval iteration over one sampler.
#[derive(Debug)]
pub struct IntervalIteratorContext {
    sampler: Sampler,
    config: IntervalContextConfig,
    committed: Option<Arc<IntervalState>>,
}

impl IntervalIteratorContext {
    /// Creates an uncommitted context with default parameters.
    #[must_use]
    pub fn new(sampler: Sampler) -> Self {
        Self::with_config(sampler, IntervalContextConfig::default())
    }

    /// Creates an uncommitted context with the given parameters.
    #[must_use]
    pub const fn with_config(sampler: Sampler, config: IntervalContextConfig) -> Self {
        Self {
            sampler,
            config,
            committed: None,
        }
    }

    /// The pending parameters.
    #[must_use]
    pub const fn config(&self) -> &IntervalContextConfig {
        &self.config
    }

    /// The sampler iterated over.
    #[must_use]
    pub const fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Set the attribute whose values bound the intervals.
    pub fn set_attribute_index(&mut self, index: usize) {
        self.config.attribute_index = index;
    }

    /// Set the value ranges of interest; empty means every value.
    pub fn set_value_ranges(&mut self, ranges: Vec<ValueRange>) {
        self.config.value_ranges = ranges;
    }

    /// Set the resolution hint; 1 iterates elementary cells.
    pub fn set_interval_resolution_hint(&mut self, hint: f64) {
        self.config.interval_resolution_hint = hint;
    }

    /// Validate the pending parameters and publish them.
    ///
    /// # Errors
    ///
    /// Returns a configuration error or [`VolumeError::InvalidAttributeIndex`];
    /// the context is uncommitted afterwards.
    pub fn commit(&mut self) -> Result<()> {
        self.committed = None;
        self.config.validate()?;
        self.sampler.check_attribute(self.config.attribute_index)?;

        let value_ranges = merge_ranges(&self.config.value_ranges);
        let hint = clamp_hint(self.config.interval_resolution_hint);
        let state = IntervalState::new(
            self.sampler.clone(),
            self.config.attribute_index,
            value_ranges,
            hint,
        );

        debug!(
            attribute = state.attribute,
            value_ranges = state.value_ranges.len(),
            depth = state.depth,
            elementary = state.elementary,
            "committed interval iterator context"
        );

        self.committed = Some(Arc::new(state));
        Ok(())
    }

    /// Whether a snapshot is published.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Traversal depth of the published snapshot.
    #[must_use]
    pub fn max_depth(&self) -> Option<u32> {
        self.committed.as_ref().map(|s| s.depth)
    }

    fn state(&self) -> Result<&Arc<IntervalState>> {
        self.committed
            .as_ref()
            .ok_or_else(|| not_committed("interval iterator context"))
    }

    /// Bytes to reserve for an iterator of the given width.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Unsupported`] for a non-native vector width.
    pub fn iterator_size(&self, width: LaneWidth) -> Result<usize> {
        interval_iterator_size(width)
    }

    /// Creates an iterator over `ray` at `time`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotCommitted`] or [`VolumeError::InvalidTime`].
    pub fn iterator(&self, ray: &Ray, time: f64) -> Result<IntervalIterator> {
        let state = self.state()?;
        check_time(time)?;
        Ok(IntervalIterator::new(Arc::clone(state), ray, time))
    }

    /// Initializes an iterator in caller-owned storage.
    ///
    /// # Errors
    ///
    /// Same as [`IntervalIteratorContext::iterator`].
    pub fn init_iterator<'a>(
        &self,
        slot: &'a mut Option<IntervalIterator>,
        ray: &Ray,
        time: f64,
    ) -> Result<&'a mut IntervalIterator> {
        let iterator = self.iterator(ray, time)?;
        Ok(slot.insert(iterator))
    }

    /// Initializes a lane-batched iterator in caller-owned storage.
    ///
    /// Lanes outside `valid` never produce intervals.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Unsupported`] unless `W` is the native width,
    /// and the errors of [`IntervalIteratorContext::iterator`] for any
    /// active lane.
    pub fn init_iterator_n<'a, const W: usize>(
        &self,
        slot: &'a mut Option<IntervalIteratorN<W>>,
        valid: &LaneMask<W>,
        rays: &RayN<W>,
        times: &[f64; W],
    ) -> Result<&'a mut IntervalIteratorN<W>> {
        check_native::<W>("interval iteration")?;
        let state = self.state()?;
        for lane in (0..W).filter(|&lane| valid[lane]) {
            check_time(times[lane])?;
        }
        Ok(slot.insert(IntervalIteratorN::new(state, valid, rays, times)))
    }
}

/// Parameters for isosurface hit iteration over one sampler.
#[derive(Debug)]
pub struct HitIteratorContext {
    sampler: Sampler,
    config: HitContextConfig,
    committed: Option<Arc<HitState>>,
}

impl HitIteratorContext {
    /// Creates an uncommitted context without isovalues.
    #[must_use]
    pub fn new(sampler: Sampler) -> Self {
        Self::with_config(sampler, HitContextConfig::default())
    }

    /// Creates an uncommitted context with the given parameters.
    #[must_use]
    pub const fn with_config(sampler: Sampler, config: HitContextConfig) -> Self {
        Self {
            sampler,
            config,
            committed: None,
        }
    }

    /// The pending parameters.
    #[must_use]
    pub const fn config(&self) -> &HitContextConfig {
        &self.config
    }

    /// The sampler iterated over.
    #[must_use]
    pub const fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Set the attribute whose isosurfaces are searched.
    pub fn set_attribute_index(&mut self, index: usize) {
        self.config.attribute_index = index;
    }

    /// Set the isovalues; empty means no hits.
    pub fn set_values(&mut self, values: Vec<f64>) {
        self.config.values = values;
    }

    /// Validate the pending parameters and publish them.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidConfig`] for NaN isovalues or
    /// [`VolumeError::InvalidAttributeIndex`]; the context is uncommitted
    /// afterwards.
    pub fn commit(&mut self) -> Result<()> {
        self.committed = None;
        self.config.validate()?;
        self.sampler.check_attribute(self.config.attribute_index)?;

        let mut values = self.config.values.clone();
        values.sort_by(f64::total_cmp);
        values.dedup();
        if values.len() != self.config.values.len() {
            warn!(
                given = self.config.values.len(),
                unique = values.len(),
                "duplicate isovalues removed"
            );
        }

        let hint = if self.sampler.volume().kind() == VolumeKind::SparseHierarchical {
            SPARSE_HIT_RESOLUTION
        } else {
            DEFAULT_HIT_RESOLUTION
        };
        let intervals = IntervalState::new(
            self.sampler.clone(),
            self.config.attribute_index,
            Vec::new(),
            hint,
        );

        debug!(
            attribute = intervals.attribute,
            isovalues = values.len(),
            depth = intervals.depth,
            "committed hit iterator context"
        );

        self.committed = Some(Arc::new(HitState { intervals, values }));
        Ok(())
    }

    /// Whether a snapshot is published.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Sorted isovalues of the published snapshot.
    #[must_use]
    pub fn values(&self) -> Option<&[f64]> {
        self.committed.as_ref().map(|s| s.values.as_slice())
    }

    /// Traversal depth of the published snapshot.
    #[must_use]
    pub fn max_depth(&self) -> Option<u32> {
        self.committed.as_ref().map(|s| s.intervals.depth)
    }

    fn state(&self) -> Result<&Arc<HitState>> {
        self.committed
            .as_ref()
            .ok_or_else(|| not_committed("hit iterator context"))
    }

    /// Bytes to reserve for an iterator of the given width.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Unsupported`] for a non-native vector width.
    pub fn iterator_size(&self, width: LaneWidth) -> Result<usize> {
        hit_iterator_size(width)
    }

    /// Creates an iterator over `ray` at `time`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotCommitted`] or [`VolumeError::InvalidTime`].
    pub fn iterator(&self, ray: &Ray, time: f64) -> Result<HitIterator> {
        let state = self.state()?;
        check_time(time)?;
        Ok(HitIterator::new(Arc::clone(state), ray, time))
    }

    /// Initializes an iterator in caller-owned storage.
    ///
    /// # Errors
    ///
    /// Same as [`HitIteratorContext::iterator`].
    pub fn init_iterator<'a>(
        &self,
        slot: &'a mut Option<HitIterator>,
        ray: &Ray,
        time: f64,
    ) -> Result<&'a mut HitIterator> {
        let iterator = self.iterator(ray, time)?;
        Ok(slot.insert(iterator))
    }

    /// Initializes a lane-batched iterator in caller-owned storage.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Unsupported`] unless `W` is the native width,
    /// and the errors of [`HitIteratorContext::iterator`] for any active
    /// lane.
    pub fn init_iterator_n<'a, const W: usize>(
        &self,
        slot: &'a mut Option<HitIteratorN<W>>,
        valid: &LaneMask<W>,
        rays: &RayN<W>,
        times: &[f64; W],
    ) -> Result<&'a mut HitIteratorN<W>> {
        check_native::<W>("hit iteration")?;
        let state = self.state()?;
        for lane in (0..W).filter(|&lane| valid[lane]) {
            check_time(times[lane])?;
        }
        Ok(slot.insert(HitIteratorN::new(state, valid, rays, times)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::volume::{Attribute, StructuredRegularVolume, Volume};

    fn sampler() -> Sampler {
        let mut grid = StructuredRegularVolume::new([2, 2, 2]);
        grid.add_attribute(Attribute::new("f", vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]));
        let mut volume = Volume::from(grid);
        volume.commit().unwrap();
        Sampler::new(Arc::new(volume)).unwrap()
    }

    #[test]
    fn test_merge_ranges() {
        let merged = merge_ranges(&[
            ValueRange::new(3.0, 4.0),
            ValueRange::new(0.0, 1.0),
            ValueRange::new(0.5, 2.0),
        ]);
        assert_eq!(merged, vec![ValueRange::new(0.0, 2.0), ValueRange::new(3.0, 4.0)]);
    }

    #[test]
    fn test_interval_commit() {
        let mut context = IntervalIteratorContext::new(sampler());
        let ray = Ray::default();
        assert!(matches!(
            context.iterator(&ray, 0.0),
            Err(VolumeError::NotCommitted { .. })
        ));

        context.set_attribute_index(1);
        assert!(context.commit().is_err());
        assert!(!context.is_committed());

        context.set_attribute_index(0);
        context.set_interval_resolution_hint(3.0);
        context.commit().unwrap();
        assert_eq!(context.max_depth(), Some(0));
        assert!(context.committed.as_ref().unwrap().elementary);
        assert!(matches!(context.iterator(&ray, 2.0), Err(VolumeError::InvalidTime(_))));

        context.set_value_ranges(vec![ValueRange::empty()]);
        assert!(context.commit().is_err_and(|e| e.is_config_error()));
    }

    #[test]
    fn test_hit_commit_sorts_values() {
        let mut context = HitIteratorContext::new(sampler());
        context.set_values(vec![0.75, 0.25, 0.75]);
        context.commit().unwrap();
        assert_eq!(context.values(), Some(&[0.25, 0.75][..]));
        assert!(!context.committed.as_ref().unwrap().intervals.elementary);

        context.set_values(vec![f64::NAN]);
        assert!(context.commit().is_err());
        assert_eq!(context.values(), None);
    }

    #[test]
    fn test_accepts_value_ranges() {
        let state = IntervalState::new(
            sampler(),
            0,
            vec![ValueRange::new(0.2, 0.4)],
            0.5,
        );
        assert!(state.accepts(&ValueRange::new(0.0, 0.3)));
        assert!(!state.accepts(&ValueRange::new(0.5, 1.0)));
        let all = IntervalState::new(sampler(), 0, Vec::new(), 0.5);
        assert!(all.accepts(&ValueRange::new(5.0, 6.0)));
    }
}

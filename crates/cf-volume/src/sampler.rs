//! Point sampling of committed volumes.
//!
//! A [`Sampler`] binds one committed [`Volume`] and resolves the filters used
//! for values and gradients. Every entry point validates the attribute index
//! and time before evaluating; lane-batched entry points additionally require
//! the native lane width and never touch the outputs of inactive lanes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cf_volume::{Attribute, Sampler, StructuredRegularVolume, Volume};
//! use nalgebra::Point3;
//!
//! let mut grid = StructuredRegularVolume::new([2, 2, 2]);
//! grid.add_attribute(Attribute::new("a", vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]));
//! grid.add_attribute(Attribute::new("b", vec![2.0; 8]));
//! let mut volume = Volume::from(grid);
//! volume.commit().unwrap();
//!
//! let sampler = Sampler::new(Arc::new(volume)).unwrap();
//! let mut out = [0.0; 2];
//! sampler.sample_m(&Point3::new(0.5, 0.5, 0.5), &[0, 1], 0.0, &mut out).unwrap();
//! assert_eq!(out, [0.5, 2.0]);
//! assert!(sampler.sample(&Point3::origin(), 0, 1.5).is_err());
//! ```

use std::sync::Arc;

use nalgebra::{Point3, Vector3};
use tracing::warn;

use crate::config::{Filter, SamplerConfig};
use crate::dispatch::check_native;
use crate::error::{Result, VolumeError, check_attribute, check_time};
use crate::lanes::{LaneMask, Vec3xN};
use crate::volume::{Volume, VolumeKernel};

/// Evaluates values and gradients of one committed volume.
#[derive(Debug, Clone)]
pub struct Sampler {
    volume: Arc<Volume>,
    config: SamplerConfig,
    filter: Filter,
    gradient_filter: Filter,
}

impl Sampler {
    /// Creates a sampler with the volume's own filter.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotCommitted`] if the volume is not committed.
    pub fn new(volume: Arc<Volume>) -> Result<Self> {
        Self::with_config(volume, SamplerConfig::default())
    }

    /// Creates a sampler with filter overrides.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::NotCommitted`] if the volume is not committed.
    pub fn with_config(volume: Arc<Volume>, config: SamplerConfig) -> Result<Self> {
        volume.ensure_committed()?;
        let filter = volume.filter();
        let mut sampler = Self {
            volume,
            config: SamplerConfig::default(),
            filter,
            gradient_filter: filter,
        };
        sampler.commit(config);
        Ok(sampler)
    }

    /// Replace the filter overrides.
    ///
    /// Overrides on representations without a filter concept are ignored
    /// with a warning.
    pub fn commit(&mut self, config: SamplerConfig) {
        let kind = self.volume.kind();
        if config.has_overrides() && !kind.supports_filter() {
            warn!(?kind, "filter overrides ignored for this volume representation");
        }
        let own = self.volume.filter();
        let (filter, gradient_filter) = if kind.supports_filter() {
            let filter = config.filter.unwrap_or(own);
            (filter, config.gradient_filter.unwrap_or(filter))
        } else {
            (own, own)
        };
        self.config = config;
        self.filter = filter;
        self.gradient_filter = gradient_filter;
    }

    /// The sampled volume.
    #[must_use]
    pub const fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// The committed overrides.
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Filter used for values.
    #[must_use]
    pub const fn filter(&self) -> Filter {
        self.filter
    }

    /// Filter used for gradients.
    #[must_use]
    pub const fn gradient_filter(&self) -> Filter {
        self.gradient_filter
    }

    pub(crate) fn kernel(&self) -> &dyn VolumeKernel {
        self.volume.kernel()
    }

    pub(crate) fn check_attribute(&self, attribute: usize) -> Result<()> {
        check_attribute(attribute, self.volume.attribute_count())
    }

    /// Value without argument checks.
    #[inline]
    pub(crate) fn sample_unchecked(&self, point: &Point3<f64>, attribute: usize, time: f64) -> f64 {
        self.kernel().sample(point, attribute, time, self.filter)
    }

    /// Samples one attribute at a point.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidAttributeIndex`] or
    /// [`VolumeError::InvalidTime`].
    pub fn sample(&self, point: &Point3<f64>, attribute: usize, time: f64) -> Result<f64> {
        self.check_attribute(attribute)?;
        check_time(time)?;
        Ok(self.sample_unchecked(point, attribute, time))
    }

    /// Gradient of one attribute at a point.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidAttributeIndex`] or
    /// [`VolumeError::InvalidTime`].
    pub fn gradient(
        &self,
        point: &Point3<f64>,
        attribute: usize,
        time: f64,
    ) -> Result<Vector3<f64>> {
        self.check_attribute(attribute)?;
        check_time(time)?;
        Ok(self
            .kernel()
            .gradient(point, attribute, time, self.gradient_filter))
    }

    /// Samples one attribute at many points, each with its own time.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::LengthMismatch`] unless `times` and `out` match
    /// `points` in length, and the errors of [`Sampler::sample`].
    pub fn sample_n(
        &self,
        points: &[Point3<f64>],
        attribute: usize,
        times: &[f64],
        out: &mut [f64],
    ) -> Result<()> {
        self.check_stream(points.len(), times, out.len())?;
        self.check_attribute(attribute)?;
        for ((value, point), &time) in out.iter_mut().zip(points).zip(times) {
            *value = self.sample_unchecked(point, attribute, time);
        }
        Ok(())
    }

    /// Samples several attributes at one point.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::LengthMismatch`] unless `out` matches
    /// `attributes` in length, and the errors of [`Sampler::sample`].
    pub fn sample_m(
        &self,
        point: &Point3<f64>,
        attributes: &[usize],
        time: f64,
        out: &mut [f64],
    ) -> Result<()> {
        if out.len() != attributes.len() {
            return Err(VolumeError::LengthMismatch {
                expected: attributes.len(),
                actual: out.len(),
            });
        }
        check_time(time)?;
        for &attribute in attributes {
            self.check_attribute(attribute)?;
        }
        for (value, &attribute) in out.iter_mut().zip(attributes) {
            *value = self.sample_unchecked(point, attribute, time);
        }
        Ok(())
    }

    /// Gradients of one attribute at many points, each with its own time.
    ///
    /// # Errors
    ///
    /// Same as [`Sampler::sample_n`].
    pub fn gradient_n(
        &self,
        points: &[Point3<f64>],
        attribute: usize,
        times: &[f64],
        out: &mut [Vector3<f64>],
    ) -> Result<()> {
        self.check_stream(points.len(), times, out.len())?;
        self.check_attribute(attribute)?;
        let kernel = self.kernel();
        out.iter_mut()
            .zip(points.iter().zip(times))
            .for_each(|(gradient, (point, &time))| {
                *gradient = kernel.gradient(point, attribute, time, self.gradient_filter);
            });
        Ok(())
    }

    fn check_stream(&self, count: usize, times: &[f64], out: usize) -> Result<()> {
        if times.len() != count {
            return Err(VolumeError::LengthMismatch {
                expected: count,
                actual: times.len(),
            });
        }
        if out != count {
            return Err(VolumeError::LengthMismatch {
                expected: count,
                actual: out,
            });
        }
        times.iter().try_for_each(|&t| check_time(t))
    }

    /// Samples the active lanes of a batch of points.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::Unsupported`] unless `W` is the native width,
    /// and the errors of [`Sampler::sample`] for any active lane.
    pub fn sample_lanes<const W: usize>(
        &self,
        valid: &LaneMask<W>,
        points: &Vec3xN<W>,
        attribute: usize,
        times: &[f64; W],
        out: &mut [f64; W],
    ) -> Result<()> {
        check_native::<W>("sampling")?;
        self.check_lanes(valid, attribute, times)?;
        for lane in (0..W).filter(|&lane| valid[lane]) {
            out[lane] = self.sample_unchecked(&points.point(lane), attribute, times[lane]);
        }
        Ok(())
    }

    /// Gradients at the active lanes of a batch of points.
    ///
    /// # Errors
    ///
    /// Same as [`Sampler::sample_lanes`].
    pub fn gradient_lanes<const W: usize>(
        &self,
        valid: &LaneMask<W>,
        points: &Vec3xN<W>,
        attribute: usize,
        times: &[f64; W],
        out: &mut Vec3xN<W>,
    ) -> Result<()> {
        check_native::<W>("gradient sampling")?;
        self.check_lanes(valid, attribute, times)?;
        let kernel = self.kernel();
        for lane in (0..W).filter(|&lane| valid[lane]) {
            let gradient =
                kernel.gradient(&points.point(lane), attribute, times[lane], self.gradient_filter);
            out.set(lane, gradient);
        }
        Ok(())
    }

    fn check_lanes<const W: usize>(
        &self,
        valid: &LaneMask<W>,
        attribute: usize,
        times: &[f64; W],
    ) -> Result<()> {
        self.check_attribute(attribute)?;
        (0..W)
            .filter(|&lane| valid[lane])
            .try_for_each(|lane| check_time(times[lane]))
    }
}

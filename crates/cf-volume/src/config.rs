//! Configuration types for samplers, iterator contexts and hierarchy builds.
//!
//! All configs follow the same pattern: a `Default` with the documented
//! defaults, `#[must_use]` builder setters, and a `validate` that rejects
//! values no commit could accept.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};
use crate::range::ValueRange;

/// Interpolation filter used when sampling between data points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Filter {
    /// Value of the nearest data point.
    Nearest,
    /// Trilinear interpolation of the eight surrounding data points.
    #[default]
    Trilinear,
}

/// Sampler-level overrides of the volume's filter.
///
/// Representations without a filter concept ignore both fields.
///
/// # Example
///
/// ```
/// use cf_volume::{Filter, SamplerConfig};
///
/// let config = SamplerConfig::default().filter(Filter::Nearest);
/// assert_eq!(config.filter, Some(Filter::Nearest));
/// assert_eq!(config.gradient_filter, None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplerConfig {
    /// Filter for value sampling; the volume's filter when `None`.
    pub filter: Option<Filter>,
    /// Filter for gradients; the value filter when `None`.
    pub gradient_filter: Option<Filter>,
}

impl SamplerConfig {
    /// Set the value filter.
    #[must_use]
    pub const fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the gradient filter.
    #[must_use]
    pub const fn gradient_filter(mut self, filter: Filter) -> Self {
        self.gradient_filter = Some(filter);
        self
    }

    /// Returns true if either filter is overridden.
    #[must_use]
    pub const fn has_overrides(&self) -> bool {
        self.filter.is_some() || self.gradient_filter.is_some()
    }
}

/// Parameters of an interval iterator context.
///
/// # Example
///
/// ```
/// use cf_volume::{IntervalContextConfig, ValueRange};
///
/// let config = IntervalContextConfig::default()
///     .attribute_index(1)
///     .value_ranges(vec![ValueRange::new(0.2, 0.4)])
///     .interval_resolution_hint(1.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntervalContextConfig {
    /// Attribute whose values bound the intervals.
    pub attribute_index: usize,
    /// Value ranges of interest. Empty means every value.
    pub value_ranges: Vec<ValueRange>,
    /// Resolution hint in [0, 1]; 1 selects elementary cell iteration.
    pub interval_resolution_hint: f64,
}

impl Default for IntervalContextConfig {
    fn default() -> Self {
        Self {
            attribute_index: 0,
            value_ranges: Vec::new(),
            interval_resolution_hint: 0.5,
        }
    }
}

impl IntervalContextConfig {
    /// Set the attribute index.
    #[must_use]
    pub fn attribute_index(mut self, index: usize) -> Self {
        self.attribute_index = index;
        self
    }

    /// Set the value ranges of interest.
    #[must_use]
    pub fn value_ranges(mut self, ranges: Vec<ValueRange>) -> Self {
        self.value_ranges = ranges;
        self
    }

    /// Set the resolution hint.
    #[must_use]
    pub fn interval_resolution_hint(mut self, hint: f64) -> Self {
        self.interval_resolution_hint = hint;
        self
    }

    /// Validate the configuration.
    ///
    /// Out-of-range hints are accepted here and clamped at commit; only
    /// NaN hints and malformed ranges are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidConfig`] for a NaN hint or a value range
    /// with NaN or inverted bounds.
    pub fn validate(&self) -> Result<()> {
        if self.interval_resolution_hint.is_nan() {
            return Err(VolumeError::invalid_config(
                "interval resolution hint is NaN",
            ));
        }
        for range in &self.value_ranges {
            if range.is_empty() {
                return Err(VolumeError::invalid_config(format!(
                    "value range [{}, {}] is empty",
                    range.lower, range.upper
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of a hit iterator context.
///
/// # Example
///
/// ```
/// use cf_volume::HitContextConfig;
///
/// let config = HitContextConfig::default().values(vec![0.5, 0.25]);
/// assert!(config.validate().is_ok());
/// assert!(HitContextConfig::default().values(vec![f64::NAN]).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitContextConfig {
    /// Attribute whose isosurfaces are searched.
    pub attribute_index: usize,
    /// Isovalues. Empty means no hits are ever produced.
    pub values: Vec<f64>,
}

impl HitContextConfig {
    /// Set the attribute index.
    #[must_use]
    pub fn attribute_index(mut self, index: usize) -> Self {
        self.attribute_index = index;
        self
    }

    /// Set the isovalues.
    #[must_use]
    pub fn values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidConfig`] if any isovalue is NaN.
    pub fn validate(&self) -> Result<()> {
        if self.values.iter().any(|v| v.is_nan()) {
            return Err(VolumeError::invalid_config("isovalue is NaN"));
        }
        Ok(())
    }
}

/// Bounding volume hierarchy build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BvhConfig {
    /// Maximum primitives per leaf.
    pub max_leaf_size: usize,
    /// Primitive count above which subtrees are built in parallel.
    pub parallel_threshold: usize,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            parallel_threshold: 4096,
        }
    }
}

impl BvhConfig {
    /// Set the maximum leaf size.
    #[must_use]
    pub const fn max_leaf_size(mut self, size: usize) -> Self {
        self.max_leaf_size = size;
        self
    }

    /// Set the parallel build threshold.
    #[must_use]
    pub const fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::InvalidConfig`] if leaves may hold no primitive.
    pub fn validate(&self) -> Result<()> {
        if self.max_leaf_size == 0 {
            return Err(VolumeError::invalid_config("max_leaf_size must be >= 1"));
        }
        Ok(())
    }
}

//! Error types for volume, sampler and iterator operations.
//!
//! Errors fall into three classes:
//!
//! - **configuration**: illegal volume or context parameters, rejected at commit
//! - **unsupported**: a lane-width entry point called at a non-native width
//! - **precondition**: using uncommitted objects, bad attribute indices or times

use thiserror::Error;

/// Result type for volume operations.
pub type Result<T> = std::result::Result<T, VolumeError>;

/// Errors that can occur while building, sampling or iterating volumes.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum VolumeError {
    /// Invalid configuration parameter.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The grid dimensions are invalid.
    #[error("invalid grid dimensions: {x}x{y}x{z}")]
    InvalidDimensions {
        /// Vertex count along x.
        x: usize,
        /// Vertex count along y.
        y: usize,
        /// Vertex count along z.
        z: usize,
    },

    /// Grid spacing must be finite and non-zero.
    #[error("invalid grid spacing: ({x}, {y}, {z})")]
    InvalidSpacing {
        /// Spacing along x.
        x: f64,
        /// Spacing along y.
        y: f64,
        /// Spacing along z.
        z: f64,
    },

    /// An attribute array does not match the topology.
    #[error("attribute '{name}' has {actual} values, expected {expected}")]
    AttributeSizeMismatch {
        /// Name of the attribute.
        name: String,
        /// Number of values required by the topology.
        expected: usize,
        /// Number of values provided.
        actual: usize,
    },

    /// The resolution-to-depth table is malformed.
    #[error("could not map interval resolution hint: {reason}")]
    DepthMapping {
        /// Description of what is wrong with the table.
        reason: String,
    },

    /// A lane-width entry point was called at a width other than the native one.
    #[error("{operation} is only supported for the native vector width {native}, got {requested}")]
    Unsupported {
        /// The operation that was requested.
        operation: &'static str,
        /// The lane width the caller asked for.
        requested: usize,
        /// The lane width compiled into this build.
        native: usize,
    },

    /// The object must be committed before use.
    #[error("{object} must be committed before use")]
    NotCommitted {
        /// Kind of object that was not committed.
        object: &'static str,
    },

    /// Attribute index out of range.
    #[error("attribute index {index} out of range (volume has {count} attributes)")]
    InvalidAttributeIndex {
        /// Requested attribute index.
        index: usize,
        /// Number of attributes on the volume.
        count: usize,
    },

    /// Time outside the temporal support [0, 1].
    #[error("time {0} outside [0, 1]")]
    InvalidTime(f64),

    /// Per-point input and output slices disagree in length.
    #[error("input/output length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
}

impl VolumeError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a depth mapping error.
    #[must_use]
    pub fn depth_mapping(reason: impl Into<String>) -> Self {
        Self::DepthMapping {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-width error.
    #[must_use]
    pub const fn unsupported(operation: &'static str, requested: usize, native: usize) -> Self {
        Self::Unsupported {
            operation,
            requested,
            native,
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::InvalidDimensions { .. }
                | Self::InvalidSpacing { .. }
                | Self::AttributeSizeMismatch { .. }
                | Self::DepthMapping { .. }
        )
    }

    /// Check if this is an unsupported-width error.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Check if this is a violated precondition of the calling code.
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Self::NotCommitted { .. }
                | Self::InvalidAttributeIndex { .. }
                | Self::InvalidTime(_)
                | Self::LengthMismatch { .. }
        )
    }
}

/// Fails with [`VolumeError::InvalidTime`] unless `time` lies in [0, 1].
pub(crate) fn check_time(time: f64) -> Result<()> {
    if (0.0..=1.0).contains(&time) {
        Ok(())
    } else {
        Err(VolumeError::InvalidTime(time))
    }
}

/// Fails with [`VolumeError::InvalidAttributeIndex`] unless `index < count`.
pub(crate) const fn check_attribute(index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(VolumeError::InvalidAttributeIndex { index, count })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VolumeError::unsupported("hit iteration", 4, 8);
        let msg = err.to_string();
        assert!(msg.contains("hit iteration"));
        assert!(msg.contains('4'));
        assert!(msg.contains('8'));

        let err = VolumeError::InvalidAttributeIndex { index: 3, count: 2 };
        assert!(err.to_string().contains("3"));

        let err = VolumeError::invalid_config("azimuth out of range");
        assert!(err.to_string().contains("azimuth"));
    }

    #[test]
    fn test_error_predicates() {
        let err = VolumeError::invalid_config("bad");
        assert!(err.is_config_error());
        assert!(!err.is_unsupported());
        assert!(!err.is_precondition_violation());

        let err = VolumeError::depth_mapping("first breakpoint is not 0");
        assert!(err.is_config_error());

        let err = VolumeError::unsupported("sampling", 16, 8);
        assert!(err.is_unsupported());
        assert!(!err.is_config_error());

        let err = VolumeError::InvalidTime(1.5);
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn test_check_time() {
        assert!(check_time(0.0).is_ok());
        assert!(check_time(1.0).is_ok());
        assert_eq!(check_time(-0.1), Err(VolumeError::InvalidTime(-0.1)));
        assert!(check_time(f64::NAN).is_err());
    }

    #[test]
    fn test_check_attribute() {
        assert!(check_attribute(0, 1).is_ok());
        assert_eq!(
            check_attribute(1, 1),
            Err(VolumeError::InvalidAttributeIndex { index: 1, count: 1 })
        );
    }
}

//! Lane-width dispatch.
//!
//! Every performance-relevant operation exists in a scalar form and in a
//! lane-batched form generic over `const W: usize`. Only one lane width, the
//! native width, is compiled as a real entry point; it is chosen at build time
//! with the `native-width-4` or `native-width-16` cargo features and is 8 when
//! neither is enabled. Lane-batched calls at any other width fail with
//! [`VolumeError::Unsupported`] instead of being emulated.
//!
//! # Example
//!
//! ```
//! use cf_volume::{LaneWidth, NATIVE_WIDTH};
//!
//! assert_eq!(LaneWidth::native().lanes(), NATIVE_WIDTH);
//! assert!(LaneWidth::One.is_supported());
//! ```

use std::mem::size_of;

use crate::error::{Result, VolumeError};
use crate::iterator::{HitIterator, HitIteratorN, IntervalIterator, IntervalIteratorN};

/// The lane width compiled into this build.
#[cfg(feature = "native-width-16")]
pub const NATIVE_WIDTH: usize = 16;

/// The lane width compiled into this build.
#[cfg(all(feature = "native-width-4", not(feature = "native-width-16")))]
pub const NATIVE_WIDTH: usize = 4;

/// The lane width compiled into this build.
#[cfg(not(any(feature = "native-width-4", feature = "native-width-16")))]
pub const NATIVE_WIDTH: usize = 8;

/// Lane widths a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneWidth {
    /// Scalar execution.
    One,
    /// Four lanes.
    Four,
    /// Eight lanes.
    Eight,
    /// Sixteen lanes.
    Sixteen,
}

impl LaneWidth {
    /// All widths, narrowest first.
    pub const ALL: [Self; 4] = [Self::One, Self::Four, Self::Eight, Self::Sixteen];

    /// Number of lanes.
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Four => 4,
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Maps a lane count back to a width.
    #[must_use]
    pub const fn from_lanes(lanes: usize) -> Option<Self> {
        match lanes {
            1 => Some(Self::One),
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            16 => Some(Self::Sixteen),
            _ => None,
        }
    }

    /// The native width of this build.
    #[must_use]
    pub const fn native() -> Self {
        match Self::from_lanes(NATIVE_WIDTH) {
            Some(width) => width,
            None => Self::Eight,
        }
    }

    /// Scalar and native widths are supported, nothing else.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::One) || self.lanes() == NATIVE_WIDTH
    }
}

/// Fails unless `W` is the native width.
pub(crate) const fn check_native<const W: usize>(operation: &'static str) -> Result<()> {
    if W == NATIVE_WIDTH {
        Ok(())
    } else {
        Err(VolumeError::unsupported(operation, W, NATIVE_WIDTH))
    }
}

/// Bytes a caller must reserve for an interval iterator of the given width.
///
/// # Errors
///
/// Returns [`VolumeError::Unsupported`] for a non-native vector width.
pub fn interval_iterator_size(width: LaneWidth) -> Result<usize> {
    match width {
        LaneWidth::One => Ok(size_of::<IntervalIterator>()),
        w if w.lanes() == NATIVE_WIDTH => Ok(size_of::<IntervalIteratorN<NATIVE_WIDTH>>()),
        w => Err(VolumeError::unsupported(
            "interval iterator size",
            w.lanes(),
            NATIVE_WIDTH,
        )),
    }
}

/// Bytes a caller must reserve for a hit iterator of the given width.
///
/// # Errors
///
/// Returns [`VolumeError::Unsupported`] for a non-native vector width.
pub fn hit_iterator_size(width: LaneWidth) -> Result<usize> {
    match width {
        LaneWidth::One => Ok(size_of::<HitIterator>()),
        w if w.lanes() == NATIVE_WIDTH => Ok(size_of::<HitIteratorN<NATIVE_WIDTH>>()),
        w => Err(VolumeError::unsupported(
            "hit iterator size",
            w.lanes(),
            NATIVE_WIDTH,
        )),
    }
}

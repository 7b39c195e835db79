//! Mapping from the interval resolution hint to a traversal depth.
//!
//! "Depth" means different things per representation: the node level of a
//! sparse hierarchical grid, or the level of a BVH. The mapping is a fixed,
//! right-continuous step table of `(hint breakpoint, depth)` pairs built once
//! per context commit.
//!
//! # Example
//!
//! ```
//! use cf_volume::DepthMap;
//!
//! let map = DepthMap::sparse();
//! assert_eq!(map.map(0.0), 0);
//! assert_eq!(map.map(0.5), 2);
//! assert_eq!(map.map(1.0), 3);
//! ```

use smallvec::SmallVec;

use crate::error::{Result, VolumeError};

/// Hint at and below which BVH depths up to the default are used.
const DEFAULT_RANGE_BEGIN: f64 = 0.45;

/// Hint from which BVH depths beyond the default are used.
const DEFAULT_RANGE_END: f64 = 0.55;

/// BVH depth selected around the middle of the hint range, at most.
const MAX_DEFAULT_DEPTH: u32 = 6;

/// A monotone step table from resolution hint to depth.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    breakpoints: SmallVec<[(f64, u32); 16]>,
}

impl DepthMap {
    /// Build a table from explicit breakpoints.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeError::DepthMapping`] if the table is empty, its first
    /// breakpoint is not exactly 0, its last exceeds 1, or breakpoints or
    /// depths decrease.
    pub fn from_breakpoints<I>(breakpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, u32)>,
    {
        let breakpoints: SmallVec<[(f64, u32); 16]> = breakpoints.into_iter().collect();

        let (Some(first), Some(last)) = (breakpoints.first(), breakpoints.last()) else {
            return Err(VolumeError::depth_mapping("table is empty"));
        };
        if first.0 != 0.0 {
            return Err(VolumeError::depth_mapping(format!(
                "first breakpoint is {}, expected 0",
                first.0
            )));
        }
        if last.0 > 1.0 || last.0.is_nan() {
            return Err(VolumeError::depth_mapping(format!(
                "last breakpoint {} exceeds 1",
                last.0
            )));
        }
        for pair in breakpoints.windows(2) {
            if pair[1].0 < pair[0].0 || pair[1].1 < pair[0].1 {
                return Err(VolumeError::depth_mapping("table is not monotone"));
            }
        }

        Ok(Self { breakpoints })
    }

    /// The table of sparse hierarchical grids, whose deepest level is 3.
    #[must_use]
    pub fn sparse() -> Self {
        Self {
            breakpoints: SmallVec::from_slice(&[(0.0, 0), (0.2, 1), (0.4, 2), (0.8, 3)]),
        }
    }

    /// The table of a BVH whose deepest leaf is at `depth`.
    ///
    /// Hints in [0, 0.45] spread over depths up to a default depth of
    /// `min(depth / 2, 6)` (6 when `depth > 6`), hints in [0.55, 1) spread
    /// over the remaining depths, and hint 1 maps to `depth`.
    #[must_use]
    pub fn bvh(depth: u32) -> Self {
        let default_depth = if depth > MAX_DEFAULT_DEPTH {
            MAX_DEFAULT_DEPTH
        } else {
            depth / 2
        };

        let mut breakpoints = SmallVec::new();
        if default_depth == 0 {
            breakpoints.push((0.0, 0));
        } else {
            for i in 0..=default_depth {
                let hint = f64::from(i) / f64::from(default_depth) * DEFAULT_RANGE_BEGIN;
                breakpoints.push((hint, i));
            }
        }

        for i in (default_depth + 1)..depth {
            let hint = f64::from(i - (default_depth + 1)) / f64::from(depth - (default_depth + 1))
                * (1.0 - DEFAULT_RANGE_END)
                + DEFAULT_RANGE_END;
            breakpoints.push((hint, i));
        }

        breakpoints.push((1.0, depth));
        Self { breakpoints }
    }

    /// The table of representations without a depth concept; always 0.
    #[must_use]
    pub fn flat() -> Self {
        Self {
            breakpoints: SmallVec::from_slice(&[(0.0, 0)]),
        }
    }

    /// Depth of the last breakpoint at or below `hint`.
    #[must_use]
    pub fn map(&self, hint: f64) -> u32 {
        let index = self.breakpoints.partition_point(|&(b, _)| b <= hint);
        self.breakpoints[index.saturating_sub(1)].1
    }

    /// Deepest depth in the table.
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.breakpoints.last().map_or(0, |&(_, d)| d)
    }

    /// The `(breakpoint, depth)` pairs.
    #[must_use]
    pub fn breakpoints(&self) -> &[(f64, u32)] {
        &self.breakpoints
    }
}

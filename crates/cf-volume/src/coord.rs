//! Integer cell coordinates.

use std::ops::{Add, Index, Sub};

/// A discrete 3D coordinate of a grid cell, voxel or hierarchy node.
///
/// Uses `i32` so sparse grids may index voxels on either side of their origin.
///
/// # Example
///
/// ```
/// use cf_volume::CellCoord;
///
/// let coord = CellCoord::new(9, -3, 17);
/// assert_eq!(coord.align_down(3), CellCoord::new(8, -8, 16));
/// assert_eq!(coord[1], -3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellCoord {
    /// X index.
    pub x: i32,
    /// Y index.
    pub y: i32,
    /// Z index.
    pub z: i32,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Creates a coordinate with the same index on every axis.
    #[must_use]
    pub const fn splat(v: i32) -> Self {
        Self::new(v, v, v)
    }

    /// Returns the coordinate as an array.
    #[must_use]
    pub const fn as_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns this coordinate with one axis replaced.
    #[must_use]
    pub const fn with_axis(self, axis: usize, value: i32) -> Self {
        match axis {
            0 => Self::new(value, self.y, self.z),
            1 => Self::new(self.x, value, self.z),
            _ => Self::new(self.x, self.y, value),
        }
    }

    /// Rounds every component down to a multiple of `2^log2`.
    ///
    /// This is the origin of the enclosing node in a grid whose nodes span
    /// `2^log2` cells per axis, for negative indices too.
    #[must_use]
    pub const fn align_down(self, log2: u32) -> Self {
        let mask = !((1i32 << log2) - 1);
        Self::new(self.x & mask, self.y & mask, self.z & mask)
    }

    /// Arithmetic shift of every component, i.e. floor division by `2^log2`.
    #[must_use]
    pub const fn shr(self, log2: u32) -> Self {
        Self::new(self.x >> log2, self.y >> log2, self.z >> log2)
    }

    /// Multiplies every component by `2^log2`.
    #[must_use]
    pub const fn shl(self, log2: u32) -> Self {
        Self::new(self.x << log2, self.y << log2, self.z << log2)
    }

    /// Checks whether every component lies in `[min, max)`.
    #[must_use]
    pub const fn within(self, min: Self, max: Self) -> bool {
        self.x >= min.x
            && self.x < max.x
            && self.y >= min.y
            && self.y < max.y
            && self.z >= min.z
            && self.z < max.z
    }
}

impl Index<usize> for CellCoord {
    type Output = i32;

    fn index(&self, axis: usize) -> &i32 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

impl Add for CellCoord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.x.wrapping_add(rhs.x),
            self.y.wrapping_add(rhs.y),
            self.z.wrapping_add(rhs.z),
        )
    }
}

impl Sub for CellCoord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.x.wrapping_sub(rhs.x),
            self.y.wrapping_sub(rhs.y),
            self.z.wrapping_sub(rhs.z),
        )
    }
}

impl From<[i32; 3]> for CellCoord {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down_negative() {
        assert_eq!(CellCoord::new(-1, -8, -9).align_down(3), CellCoord::new(-8, -8, -16));
        assert_eq!(CellCoord::new(7, 8, 0).align_down(3), CellCoord::new(0, 8, 0));
    }

    #[test]
    fn test_shr_is_floor_division() {
        assert_eq!(CellCoord::new(-1, 15, 16).shr(3), CellCoord::new(-1, 1, 2));
        assert_eq!(CellCoord::new(-1, 1, 2).shl(3), CellCoord::new(-8, 8, 16));
    }

    #[test]
    fn test_with_axis() {
        let c = CellCoord::new(1, 2, 3).with_axis(1, 9);
        assert_eq!(c, CellCoord::new(1, 9, 3));
    }

    #[test]
    fn test_within() {
        let min = CellCoord::splat(0);
        let max = CellCoord::splat(4);
        assert!(CellCoord::new(0, 3, 2).within(min, max));
        assert!(!CellCoord::new(0, 4, 2).within(min, max));
    }

    #[test]
    fn test_arithmetic() {
        let a = CellCoord::new(1, 2, 3);
        let b = CellCoord::new(1, 1, 1);
        assert_eq!(a + b, CellCoord::new(2, 3, 4));
        assert_eq!(a - b, CellCoord::new(0, 1, 2));
    }
}

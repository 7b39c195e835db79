//! Closed scalar ranges used for attribute value bounds and ray parameters.

/// A closed range `[lower, upper]` of attribute values or ray parameters.
///
/// An empty range has `lower > upper`; [`ValueRange::empty`] is the identity
/// for [`ValueRange::extend`].
///
/// # Example
///
/// ```
/// use cf_volume::ValueRange;
///
/// let mut range = ValueRange::empty();
/// range.extend(2.0);
/// range.extend(-1.0);
/// assert_eq!(range, ValueRange::new(-1.0, 2.0));
/// assert!(range.contains(0.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRange {
    /// Lower bound (inclusive).
    pub lower: f64,
    /// Upper bound (inclusive).
    pub upper: f64,
}

impl ValueRange {
    /// Creates a range, ordering the bounds so `lower <= upper`.
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// The empty range.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            lower: f64::INFINITY,
            upper: f64::NEG_INFINITY,
        }
    }

    /// A range holding a single value.
    #[must_use]
    pub const fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Returns true if the range holds no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower > self.upper || self.lower.is_nan() || self.upper.is_nan()
    }

    /// Grows the range to include `value`. NaN values are ignored.
    pub fn extend(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.lower = self.lower.min(value);
        self.upper = self.upper.max(value);
    }

    /// Grows the range to include another range.
    pub fn extend_range(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    /// Returns the union hull of two ranges.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut result = *self;
        result.extend_range(other);
        result
    }

    /// Returns the range of `a + b` for `a` in `self` and `b` in `other`.
    #[must_use]
    pub fn sum(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            lower: self.lower + other.lower,
            upper: self.upper + other.upper,
        }
    }

    /// Checks if the range contains a value (bounds inclusive).
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Checks if two ranges share at least one value.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.lower <= other.upper && other.lower <= self.upper
    }

    /// Returns the intersection of two ranges, if they overlap.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        (lower <= upper).then_some(Self { lower, upper })
    }

    /// Width of the range, zero when empty.
    #[must_use]
    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.upper - self.lower
        }
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<(f64, f64)> for ValueRange {
    fn from((a, b): (f64, f64)) -> Self {
        Self::new(a, b)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_bounds() {
        let r = ValueRange::new(3.0, 1.0);
        assert_eq!(r.lower, 1.0);
        assert_eq!(r.upper, 3.0);
    }

    #[test]
    fn test_empty_identity() {
        let mut r = ValueRange::empty();
        assert!(r.is_empty());
        r.extend_range(&ValueRange::new(0.0, 1.0));
        assert_eq!(r, ValueRange::new(0.0, 1.0));
        assert_eq!(r.width(), 1.0);
        assert_eq!(ValueRange::empty().width(), 0.0);
    }

    #[test]
    fn test_extend_ignores_nan() {
        let mut r = ValueRange::point(1.0);
        r.extend(f64::NAN);
        assert_eq!(r, ValueRange::point(1.0));
    }

    #[test]
    fn test_overlaps() {
        let a = ValueRange::new(0.0, 1.0);
        assert!(a.overlaps(&ValueRange::new(1.0, 2.0)));
        assert!(!a.overlaps(&ValueRange::new(1.5, 2.0)));
        assert!(!a.overlaps(&ValueRange::empty()));
    }

    #[test]
    fn test_intersection() {
        let a = ValueRange::new(0.0, 2.0);
        let b = ValueRange::new(1.0, 3.0);
        assert_eq!(a.intersection(&b), Some(ValueRange::new(1.0, 2.0)));
        assert_eq!(a.intersection(&ValueRange::new(5.0, 6.0)), None);
    }

    #[test]
    fn test_sum() {
        let a = ValueRange::new(-1.0, 2.0);
        let b = ValueRange::new(0.5, 1.0);
        assert_eq!(a.sum(&b), ValueRange::new(-0.5, 3.0));
        assert_eq!(ValueRange::empty().sum(&b), b);
    }
}

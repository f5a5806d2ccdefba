//! # Region Descriptor
//!
//! An `(offset, size)` byte range. A zero size is the canonical empty region.

use std::fmt;

/// A contiguous byte range inside a pool buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    /// First byte of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

impl Region {
    /// The empty region.
    pub const EMPTY: Self = Self { offset: 0, size: 0 };

    /// Creates a region starting at `offset` spanning `size` bytes.
    #[inline]
    #[must_use]
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Returns `true` for the empty/invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.size == 0
    }

    /// One past the last byte of the range.
    #[inline]
    #[must_use]
    pub const fn end(self) -> u64 {
        self.offset + self.size
    }

    /// Returns `true` if one region ends exactly where the other starts.
    #[inline]
    #[must_use]
    pub const fn is_adjacent(self, other: Self) -> bool {
        self.end() == other.offset || other.end() == self.offset
    }

    /// Returns `true` if the two ranges share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Merges two adjacent regions into one spanning both.
    #[inline]
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        debug_assert!(self.is_adjacent(other), "combine on non-adjacent regions");
        Self {
            offset: self.offset.min(other.offset),
            size: self.size + other.size,
        }
    }

    /// Splits off a `size`-byte prefix, returning `(prefix, remainder)`.
    ///
    /// The remainder is [`Region::EMPTY`] when the whole region is consumed.
    #[inline]
    #[must_use]
    pub fn subtract(self, size: u64) -> (Self, Self) {
        debug_assert!(size <= self.size, "subtract larger than region");
        let prefix = Self::new(self.offset, size);
        let remainder = if size == self.size {
            Self::EMPTY
        } else {
            Self::new(self.offset + size, self.size - size)
        };
        (prefix, remainder)
    }

    /// The range as `usize` bounds for slicing a buffer.
    #[inline]
    #[must_use]
    pub(crate) const fn span(self) -> std::ops::Range<usize> {
        to_index(self.offset)..to_index(self.end())
    }
}

/// Converts a buffer offset to a slice index.
///
/// Offsets always lie inside an in-memory buffer, so the narrowing
/// conversion cannot truncate.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn to_index(offset: u64) -> usize {
    offset as usize
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency() {
        let a = Region::new(0, 8);
        let b = Region::new(8, 4);
        let c = Region::new(13, 2);
        assert!(a.is_adjacent(b));
        assert!(b.is_adjacent(a));
        assert!(!b.is_adjacent(c));
        assert!(!a.overlaps(b));
    }

    #[test]
    fn test_combine_either_order() {
        let a = Region::new(4, 4);
        let b = Region::new(8, 6);
        assert_eq!(a.combine(b), Region::new(4, 10));
        assert_eq!(b.combine(a), Region::new(4, 10));
    }

    #[test]
    fn test_subtract() {
        let (prefix, rest) = Region::new(10, 10).subtract(8);
        assert_eq!(prefix, Region::new(10, 8));
        assert_eq!(rest, Region::new(18, 2));

        let (whole, rest) = Region::new(3, 5).subtract(5);
        assert_eq!(whole, Region::new(3, 5));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Region::new(16, 4).to_string(), "[16, 20)");
    }
}

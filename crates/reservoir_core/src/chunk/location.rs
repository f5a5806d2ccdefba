//! # Ids and Locations
//!
//! Chunk pool entries are addressed through two layers:
//! - [`ChunkId`]: the stable, opaque id handed to callers
//! - [`LocationKey`]: where that id currently lives, as `(chunk, location)`

use std::fmt;

/// Sentinel index meaning "no neighbour" / "no location".
pub(crate) const NONE: u32 = u32::MAX;

/// Stable 32-bit id of a chunk pool entry.
///
/// An id stays valid from insert until erase, regardless of how its bytes
/// move inside the chunk. Erased ids are reused last-in first-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ChunkId(u32);

impl ChunkId {
    /// Wraps a raw id value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Index into the id table.
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Packed `(chunk index, location index)` pair.
///
/// - Upper 32 bits: chunk index
/// - Lower 32 bits: location index inside the chunk's record array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LocationKey(u64);

impl LocationKey {
    /// Key of an id that is not currently live.
    pub const VACANT: Self = Self(u64::MAX);

    /// Packs a chunk index and a location index.
    #[inline]
    #[must_use]
    pub const fn new(chunk: u32, location: u32) -> Self {
        Self(((chunk as u64) << 32) | (location as u64))
    }

    /// Returns the chunk index.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the location index.
    #[inline]
    #[must_use]
    pub const fn location(self) -> u32 {
        self.0 as u32
    }

    /// Checks if this key is vacant.
    #[inline]
    #[must_use]
    pub const fn is_vacant(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for LocationKey {
    fn default() -> Self {
        Self::VACANT
    }
}

/// One occupied byte range of a chunk, linked to its offset-order neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) id: ChunkId,
    pub(crate) left: u32,
    pub(crate) right: u32,
    pub(crate) active: bool,
    pub(crate) excluded: bool,
}

impl Location {
    /// Creates an unlinked, active location.
    #[inline]
    pub(crate) const fn new(start: usize, end: usize, id: ChunkId) -> Self {
        Self {
            start,
            end,
            id,
            left: NONE,
            right: NONE,
            active: true,
            excluded: false,
        }
    }

    /// First byte, relative to the chunk.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// One past the last byte, relative to the chunk.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` for a zero-byte location.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Id owning this location.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ChunkId {
        self.id
    }

    /// Record index of the left neighbour.
    #[inline]
    #[must_use]
    pub const fn left(&self) -> Option<u32> {
        if self.left == NONE {
            None
        } else {
            Some(self.left)
        }
    }

    /// Record index of the right neighbour.
    #[inline]
    #[must_use]
    pub const fn right(&self) -> Option<u32> {
        if self.right == NONE {
            None
        } else {
            Some(self.right)
        }
    }

    /// Whether default iteration may yield this location.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether this location waits on the exclusion stack.
    #[inline]
    #[must_use]
    pub const fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Active and not excluded.
    #[inline]
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.active && !self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_key_roundtrip() {
        let key = LocationKey::new(12345, 67890);
        assert_eq!(key.chunk(), 12345);
        assert_eq!(key.location(), 67890);
        assert!(!key.is_vacant());
        assert!(LocationKey::default().is_vacant());
    }

    #[test]
    fn test_location_flags() {
        let mut location = Location::new(8, 24, ChunkId::new(3));
        assert_eq!(location.len(), 16);
        assert!(location.is_visible());
        assert_eq!(location.left(), None);

        location.excluded = true;
        assert!(location.is_active());
        assert!(!location.is_visible());
    }
}

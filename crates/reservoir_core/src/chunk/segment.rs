//! # Chunk
//!
//! A fixed-capacity byte segment kept fully packed.
//!
//! ```text
//! data:    [ loc A ][  loc C  ][ loc B ][      top free      ]
//! list:    first=A -> C -> B=last
//! records: [A, B, C]            (array order, unrelated to offsets)
//! ```
//!
//! Locations are array-backed records forming a doubly-linked list in
//! offset order. Erasing one shifts every byte after it left, so occupied
//! bytes always form the prefix `[0, capacity - top_free)`. The record array
//! stays dense by moving its last record into the erased slot.

use tracing::trace;

use super::location::{ChunkId, Location, NONE};
use crate::error::{PoolError, PoolResult};

/// Record moved by [`Chunk::erase`] to keep the array dense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Relocation {
    /// Id owning the moved record.
    pub(crate) id: ChunkId,
    /// New record index of that id.
    pub(crate) index: u32,
}

/// A fixed-capacity, fully packed buffer segment.
#[derive(Debug)]
pub struct Chunk {
    data: Box<[u8]>,
    top_free: usize,
    locations: Vec<Location>,
    first: u32,
    last: u32,
}

impl Chunk {
    /// Allocates an empty chunk of `capacity` zeroed bytes.
    pub(crate) fn new(capacity: usize) -> PoolResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| PoolError::AllocationFailed {
                requested: capacity as u64,
            })?;
        data.resize(capacity, 0);

        Ok(Self {
            data: data.into_boxed_slice(),
            top_free: capacity,
            locations: Vec::new(),
            first: NONE,
            last: NONE,
        })
    }

    /// Total capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unused bytes at the end of the chunk.
    #[inline]
    #[must_use]
    pub const fn top_free(&self) -> usize {
        self.top_free
    }

    /// Occupied bytes, all packed at the front.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.capacity() - self.top_free
    }

    /// Number of locations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if the chunk holds no locations.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Record slots allocated but not in use.
    #[inline]
    #[must_use]
    pub fn spare_slots(&self) -> usize {
        self.locations.capacity() - self.locations.len()
    }

    /// Walks the locations in offset order.
    #[must_use]
    pub fn locations(&self) -> Locations<'_> {
        Locations {
            records: &self.locations,
            cursor: self.first,
        }
    }

    /// Record at array index `index`.
    #[inline]
    pub(crate) fn location(&self, index: u32) -> &Location {
        &self.locations[index as usize]
    }

    #[inline]
    pub(crate) fn location_mut(&mut self, index: u32) -> &mut Location {
        &mut self.locations[index as usize]
    }

    /// Array index of the lowest-offset location, or `NONE`.
    #[inline]
    pub(crate) const fn first(&self) -> u32 {
        self.first
    }

    /// Bytes of the record at `index`.
    #[inline]
    pub(crate) fn bytes(&self, index: u32) -> &[u8] {
        let location = self.location(index);
        &self.data[location.start..location.end]
    }

    /// Mutable bytes of the record at `index`.
    #[inline]
    pub(crate) fn bytes_mut(&mut self, index: u32) -> &mut [u8] {
        let location = self.locations[index as usize];
        &mut self.data[location.start..location.end]
    }

    /// Appends a zero-filled location of `size` bytes after the current tail
    /// and returns its record index.
    ///
    /// The caller guarantees `size <= top_free`.
    pub(crate) fn push(&mut self, size: usize, id: ChunkId) -> u32 {
        debug_assert!(size <= self.top_free, "chunk overflow");

        let start = self.used();
        let end = start + size;
        #[allow(clippy::cast_possible_truncation)]
        let index = self.locations.len() as u32;

        let mut location = Location::new(start, end, id);
        location.left = self.last;
        if self.last == NONE {
            self.first = index;
        } else {
            self.locations[self.last as usize].right = index;
        }
        self.last = index;

        self.locations.push(location);
        self.top_free -= size;
        self.data[start..end].fill(0);
        index
    }

    /// Removes the record at `index`, closing the gap it leaves.
    ///
    /// Bytes after the location move left by its size, its list neighbours
    /// are linked to each other, and the last array record is moved into
    /// the freed slot. Returns that move, if one happened, so the caller can
    /// repoint the moved id.
    pub(crate) fn erase(&mut self, index: u32) -> Option<Relocation> {
        let erased = self.locations[index as usize];
        let size = erased.len();
        let used = self.used();

        self.data.copy_within(erased.end..used, erased.start);

        let mut cursor = erased.right;
        while cursor != NONE {
            let location = &mut self.locations[cursor as usize];
            location.start -= size;
            location.end -= size;
            cursor = location.right;
        }

        if erased.left == NONE {
            self.first = erased.right;
        } else {
            self.locations[erased.left as usize].right = erased.right;
        }
        if erased.right == NONE {
            self.last = erased.left;
        } else {
            self.locations[erased.right as usize].left = erased.left;
        }

        #[allow(clippy::cast_possible_truncation)]
        let tail = (self.locations.len() - 1) as u32;
        self.locations.swap_remove(index as usize);
        self.top_free += size;

        trace!(start = erased.start, size, shifted = used - erased.end, "location erased");

        if index == tail {
            return None;
        }

        let moved = self.locations[index as usize];
        if moved.left == NONE {
            self.first = index;
        } else {
            self.locations[moved.left as usize].right = index;
        }
        if moved.right == NONE {
            self.last = index;
        } else {
            self.locations[moved.right as usize].left = index;
        }

        Some(Relocation {
            id: moved.id,
            index,
        })
    }

    /// Calls `f` on each location in offset order, optionally skipping
    /// hidden ones.
    pub(crate) fn for_each_mut<F>(&mut self, include_hidden: bool, f: &mut F)
    where
        F: FnMut(ChunkId, &mut [u8]),
    {
        let mut cursor = self.first;
        while cursor != NONE {
            let location = self.locations[cursor as usize];
            cursor = location.right;
            if include_hidden || location.is_visible() {
                f(location.id, &mut self.data[location.start..location.end]);
            }
        }
    }
}

/// Offset-ordered walk over a chunk's locations.
pub struct Locations<'a> {
    records: &'a [Location],
    cursor: u32,
}

impl<'a> Iterator for Locations<'a> {
    type Item = &'a Location;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NONE {
            return None;
        }
        let location = &self.records[self.cursor as usize];
        self.cursor = location.right;
        Some(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(chunk: &Chunk) -> Vec<(usize, usize)> {
        chunk.locations().map(|l| (l.start(), l.end())).collect()
    }

    #[test]
    fn test_push_packs_locations() {
        let mut chunk = Chunk::new(64).unwrap();
        chunk.push(8, ChunkId::new(0));
        chunk.push(16, ChunkId::new(1));
        chunk.push(4, ChunkId::new(2));

        assert_eq!(spans(&chunk), vec![(0, 8), (8, 24), (24, 28)]);
        assert_eq!(chunk.top_free(), 36);
        assert_eq!(chunk.used(), 28);
    }

    #[test]
    fn test_erase_first_shifts_and_relocates() {
        let mut chunk = Chunk::new(64).unwrap();
        let a = chunk.push(8, ChunkId::new(0));
        let b = chunk.push(16, ChunkId::new(1));
        chunk.push(4, ChunkId::new(2));
        chunk.bytes_mut(b).fill(0xBB);

        let moved = chunk.erase(a).unwrap();
        assert_eq!(moved, Relocation { id: ChunkId::new(2), index: 0 });

        assert_eq!(spans(&chunk), vec![(0, 16), (16, 20)]);
        assert_eq!(chunk.top_free(), 44);
        assert_eq!(chunk.bytes(b), &[0xBB; 16]);
    }

    #[test]
    fn test_erase_tail_record_needs_no_relocation() {
        let mut chunk = Chunk::new(32).unwrap();
        chunk.push(4, ChunkId::new(0));
        let b = chunk.push(4, ChunkId::new(1));

        assert_eq!(chunk.erase(b), None);
        assert_eq!(spans(&chunk), vec![(0, 4)]);
    }

    #[test]
    fn test_erase_everything() {
        let mut chunk = Chunk::new(32).unwrap();
        let a = chunk.push(4, ChunkId::new(0));
        chunk.push(4, ChunkId::new(1));

        chunk.erase(a);
        chunk.erase(0);
        assert!(chunk.is_empty());
        assert_eq!(chunk.locations().count(), 0);
        assert_eq!(chunk.top_free(), 32);

        chunk.push(2, ChunkId::new(5));
        assert_eq!(spans(&chunk), vec![(0, 2)]);
    }
}

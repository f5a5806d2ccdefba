//! # Chunk Pool
//!
//! Variable-size entries packed into a growing list of fixed-capacity chunks.
//!
//! Each chunk stays fully packed: erasing an entry shifts the bytes after it
//! down, so there is never a gap between entries, only trailing free space.
//! Callers hold a [`ChunkId`]; a dense id table maps it to the entry's current
//! `(chunk, location)` in O(1) no matter how often the bytes move.
//!
//! ## Performance
//!
//! - Insert: O(chunks) scan for the first chunk with enough top space
//! - Get: O(1)
//! - Erase: O(bytes after the entry) memmove plus O(entries after it)
//!
//! The chunk capacity is the trade-off knob: larger chunks allocate less
//! often, smaller chunks copy less on erase.

use std::fmt;

use bytemuck::Pod;
use tracing::{debug, trace};

use super::location::{ChunkId, LocationKey, NONE};
use super::segment::Chunk;
use crate::config::ChunkPoolConfig;
use crate::error::{PoolError, PoolResult};

/// A pool of fully packed, fixed-capacity chunks addressed by stable ids.
///
/// # Hidden entries
///
/// Every entry starts active. An entry is hidden from [`ChunkPool::iter`]
/// (but stays allocated and addressable) while it is inactive
/// ([`ChunkPool::set_active`]) or excluded ([`ChunkPool::insert_excluded`]).
/// Excluded ids queue on a stack; [`ChunkPool::pop_excluded`] takes the most
/// recent one and makes it visible again. [`ChunkPool::iter_all`] ignores
/// both flags.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use reservoir_core::ChunkPool;
///
/// let mut pool = ChunkPool::new(1024)?;
/// let a = pool.insert(4)?;
/// let b = pool.insert(4)?;
/// pool.write(b, &7u32)?;
///
/// pool.erase(a)?;
/// assert_eq!(pool.read::<u32>(b)?, 7);
///
/// let reused = pool.insert(8)?;
/// assert_eq!(reused, a);
/// # Ok::<(), reservoir_core::PoolError>(())
/// ```
#[derive(Debug)]
pub struct ChunkPool {
    /// Append-only chunk list.
    chunks: Vec<Chunk>,
    /// Capacity of every chunk.
    chunk_capacity: usize,
    /// Id -> current location.
    ids: Vec<LocationKey>,
    /// Erased ids, reused last-in first-out.
    free_ids: Vec<ChunkId>,
    /// Excluded ids, most recent last.
    excluded: Vec<ChunkId>,
}

impl ChunkPool {
    /// Creates a pool holding one empty chunk.
    ///
    /// # Arguments
    ///
    /// * `chunk_capacity` - Size in bytes of every chunk
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AllocationFailed`] if the first chunk cannot be
    /// allocated.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_capacity` is zero.
    pub fn new(chunk_capacity: usize) -> PoolResult<Self> {
        assert!(chunk_capacity > 0, "Chunk capacity must be greater than zero");

        Ok(Self {
            chunks: vec![Chunk::new(chunk_capacity)?],
            chunk_capacity,
            ids: Vec::new(),
            free_ids: Vec::new(),
            excluded: Vec::new(),
        })
    }

    /// Creates a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] for a zero capacity, or
    /// [`PoolError::AllocationFailed`] if the first chunk cannot be allocated.
    pub fn from_config(config: &ChunkPoolConfig) -> PoolResult<Self> {
        if config.chunk_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "chunk.chunk_capacity must be greater than zero".into(),
            ));
        }
        Self::new(config.chunk_capacity)
    }

    /// Capacity of every chunk in bytes.
    #[inline]
    #[must_use]
    pub const fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Number of chunks. Never less than one.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk at `index`, for inspection.
    #[inline]
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Number of live entries across all chunks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    /// Returns `true` if `id` is live.
    #[must_use]
    pub fn contains(&self, id: ChunkId) -> bool {
        self.resolve(id).is_ok()
    }

    /// Allocates a zero-filled entry of `size` bytes.
    ///
    /// The entry goes to the first chunk with enough trailing space; a new
    /// chunk is appended when none has room.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OversizedRequest`] if `size` exceeds the chunk
    /// capacity, or [`PoolError::AllocationFailed`] if a new chunk cannot be
    /// allocated.
    pub fn insert(&mut self, size: usize) -> PoolResult<ChunkId> {
        self.insert_location(size, false)
    }

    /// Like [`ChunkPool::insert`], but the entry starts excluded and is
    /// pushed on the exclusion stack.
    ///
    /// # Errors
    ///
    /// Same as [`ChunkPool::insert`].
    pub fn insert_excluded(&mut self, size: usize) -> PoolResult<ChunkId> {
        self.insert_location(size, true)
    }

    /// Returns the bytes of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live.
    pub fn get(&self, id: ChunkId) -> PoolResult<&[u8]> {
        let key = self.resolve(id)?;
        Ok(self.chunks[key.chunk() as usize].bytes(key.location()))
    }

    /// Returns the bytes of `id` mutably.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live.
    pub fn get_mut(&mut self, id: ChunkId) -> PoolResult<&mut [u8]> {
        let key = self.resolve(id)?;
        Ok(self.chunks[key.chunk() as usize].bytes_mut(key.location()))
    }

    /// Reads a plain-old-data value from the start of the entry.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live, or
    /// [`PoolError::SizeMismatch`] if the entry is smaller than `T`.
    pub fn read<T: Pod>(&self, id: ChunkId) -> PoolResult<T> {
        let bytes = self.get(id)?;
        let expected = std::mem::size_of::<T>();
        if bytes.len() < expected {
            return Err(PoolError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..expected]))
    }

    /// Writes a plain-old-data value to the start of the entry.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live, or
    /// [`PoolError::SizeMismatch`] if the entry is smaller than `T`.
    pub fn write<T: Pod>(&mut self, id: ChunkId, value: &T) -> PoolResult<()> {
        let source = bytemuck::bytes_of(value);
        let bytes = self.get_mut(id)?;
        if bytes.len() < source.len() {
            return Err(PoolError::SizeMismatch {
                expected: source.len(),
                actual: bytes.len(),
            });
        }
        bytes[..source.len()].copy_from_slice(source);
        Ok(())
    }

    /// Erases `id`, compacting its chunk and freeing the id for reuse.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live.
    pub fn erase(&mut self, id: ChunkId) -> PoolResult<()> {
        let key = self.resolve(id)?;
        let chunk_index = key.chunk();
        let chunk = &mut self.chunks[chunk_index as usize];

        let was_excluded = chunk.location(key.location()).is_excluded();
        if let Some(moved) = chunk.erase(key.location()) {
            self.ids[moved.id.index()] = LocationKey::new(chunk_index, moved.index);
        }

        self.ids[id.index()] = LocationKey::VACANT;
        self.free_ids.push(id);
        if was_excluded {
            self.excluded.retain(|&queued| queued != id);
        }

        trace!(%id, chunk = chunk_index, "chunk pool entry erased");
        Ok(())
    }

    /// Shows or hides `id` from default iteration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live.
    pub fn set_active(&mut self, id: ChunkId, active: bool) -> PoolResult<()> {
        let key = self.resolve(id)?;
        self.chunks[key.chunk() as usize]
            .location_mut(key.location())
            .active = active;
        Ok(())
    }

    /// Returns whether `id` is active.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownId`] if `id` is not live.
    pub fn is_active(&self, id: ChunkId) -> PoolResult<bool> {
        let key = self.resolve(id)?;
        Ok(self.chunks[key.chunk() as usize]
            .location(key.location())
            .is_active())
    }

    /// Returns `true` if any id waits on the exclusion stack.
    #[inline]
    #[must_use]
    pub fn has_excluded(&self) -> bool {
        !self.excluded.is_empty()
    }

    /// Takes the most recently excluded id and clears its exclusion.
    pub fn pop_excluded(&mut self) -> Option<ChunkId> {
        let id = self.excluded.pop()?;
        let key = self.ids[id.index()];
        self.chunks[key.chunk() as usize]
            .location_mut(key.location())
            .excluded = false;
        Some(id)
    }

    /// Iterates over visible entries: chunks in order, each chunk in offset
    /// order.
    #[must_use]
    pub fn iter(&self) -> ChunkIter<'_> {
        ChunkIter::new(self, false)
    }

    /// Iterates over every live entry, hidden or not.
    #[must_use]
    pub fn iter_all(&self) -> ChunkIter<'_> {
        ChunkIter::new(self, true)
    }

    /// Calls `f` with mutable bytes of every visible entry, in
    /// [`ChunkPool::iter`] order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(ChunkId, &mut [u8]),
    {
        for chunk in &mut self.chunks {
            chunk.for_each_mut(false, &mut f);
        }
    }

    fn insert_location(&mut self, size: usize, excluded: bool) -> PoolResult<ChunkId> {
        if size > self.chunk_capacity {
            return Err(PoolError::OversizedRequest {
                requested: size,
                capacity: self.chunk_capacity,
            });
        }

        let chunk_index = match self.chunks.iter().position(|c| c.top_free() >= size) {
            Some(index) => index,
            None => self.push_chunk()?,
        };

        let id = match self.free_ids.pop() {
            Some(id) => id,
            None => {
                let raw = u32::try_from(self.ids.len()).map_err(|_| {
                    PoolError::AllocationFailed {
                        requested: size as u64,
                    }
                })?;
                self.ids.push(LocationKey::VACANT);
                ChunkId::new(raw)
            }
        };

        let chunk = &mut self.chunks[chunk_index];
        let location = chunk.push(size, id);
        if excluded {
            chunk.location_mut(location).excluded = true;
            self.excluded.push(id);
        }

        #[allow(clippy::cast_possible_truncation)]
        let key = LocationKey::new(chunk_index as u32, location);
        self.ids[id.index()] = key;

        trace!(%id, size, chunk = chunk_index, "chunk pool entry inserted");
        Ok(id)
    }

    fn push_chunk(&mut self) -> PoolResult<usize> {
        if u32::try_from(self.chunks.len()).is_err() {
            return Err(PoolError::AllocationFailed {
                requested: self.chunk_capacity as u64,
            });
        }

        self.chunks.push(Chunk::new(self.chunk_capacity)?);
        let index = self.chunks.len() - 1;
        debug!(chunk = index, capacity = self.chunk_capacity, "chunk appended");
        Ok(index)
    }

    fn resolve(&self, id: ChunkId) -> PoolResult<LocationKey> {
        match self.ids.get(id.index()) {
            Some(key) if !key.is_vacant() => Ok(*key),
            _ => Err(PoolError::UnknownId(id.get())),
        }
    }
}

impl fmt::Display for ChunkPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, chunk) in self.chunks.iter().enumerate() {
            writeln!(
                f,
                "chunk {index}: {} used, {} free, {} locations",
                chunk.used(),
                chunk.top_free(),
                chunk.len()
            )?;
            for location in chunk.locations() {
                write!(
                    f,
                    "  {} [{}, {}) {} bytes",
                    location.id(),
                    location.start(),
                    location.end(),
                    location.len()
                )?;
                if !location.is_active() {
                    write!(f, " inactive")?;
                }
                if location.is_excluded() {
                    write!(f, " excluded")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Iterator over `(id, bytes)` pairs of a [`ChunkPool`].
pub struct ChunkIter<'a> {
    pool: &'a ChunkPool,
    chunk: usize,
    cursor: u32,
    include_hidden: bool,
}

impl<'a> ChunkIter<'a> {
    fn new(pool: &'a ChunkPool, include_hidden: bool) -> Self {
        Self {
            pool,
            chunk: 0,
            cursor: pool.chunks.first().map_or(NONE, Chunk::first),
            include_hidden,
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = (ChunkId, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let pool = self.pool;
        while let Some(chunk) = pool.chunks.get(self.chunk) {
            if self.cursor == NONE {
                self.chunk += 1;
                self.cursor = pool.chunks.get(self.chunk).map_or(NONE, Chunk::first);
                continue;
            }

            let index = self.cursor;
            let location = chunk.location(index);
            self.cursor = location.right;
            if self.include_hidden || location.is_visible() {
                return Some((location.id(), chunk.bytes(index)));
            }
        }
        None
    }
}

impl<'a> IntoIterator for &'a ChunkPool {
    type Item = (ChunkId, &'a [u8]);
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_erase() {
        let mut pool = ChunkPool::new(64).unwrap();
        let id = pool.insert(12).unwrap();

        assert_eq!(pool.get(id).unwrap(), &[0u8; 12]);
        assert_eq!(pool.count(), 1);

        pool.erase(id).unwrap();
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.get(id), Err(PoolError::UnknownId(id.get())));
        assert_eq!(pool.erase(id), Err(PoolError::UnknownId(id.get())));
    }

    #[test]
    fn test_oversized_request() {
        let mut pool = ChunkPool::new(16).unwrap();
        assert_eq!(
            pool.insert(17),
            Err(PoolError::OversizedRequest {
                requested: 17,
                capacity: 16
            })
        );
        assert!(pool.insert(16).is_ok());
    }

    #[test]
    fn test_new_chunk_when_full() {
        let mut pool = ChunkPool::new(16).unwrap();
        pool.insert(10).unwrap();
        pool.insert(10).unwrap();
        assert_eq!(pool.chunk_count(), 2);

        // Back-fills the first chunk's remaining 6 bytes.
        pool.insert(6).unwrap();
        assert_eq!(pool.chunk_count(), 2);
        assert_eq!(pool.chunk(0).unwrap().top_free(), 0);
    }

    #[test]
    fn test_unknown_id() {
        let pool = ChunkPool::new(16).unwrap();
        assert!(!pool.contains(ChunkId::new(0)));
        assert!(pool.get(ChunkId::new(99)).is_err());
    }

    #[test]
    fn test_inactive_hidden_from_iter() {
        let mut pool = ChunkPool::new(64).unwrap();
        let a = pool.insert(4).unwrap();
        let b = pool.insert(4).unwrap();
        pool.set_active(a, false).unwrap();

        let visible: Vec<ChunkId> = pool.iter().map(|(id, _)| id).collect();
        assert_eq!(visible, vec![b]);
        assert_eq!(pool.iter_all().count(), 2);
        assert!(!pool.is_active(a).unwrap());
    }

    #[test]
    fn test_excluded_stack() {
        let mut pool = ChunkPool::new(64).unwrap();
        let a = pool.insert(4).unwrap();
        let b = pool.insert_excluded(4).unwrap();
        let c = pool.insert_excluded(4).unwrap();
        assert!(pool.has_excluded());
        assert_eq!(pool.iter().count(), 1);

        assert_eq!(pool.pop_excluded(), Some(c));
        let visible: Vec<ChunkId> = pool.iter().map(|(id, _)| id).collect();
        assert_eq!(visible, vec![a, c]);

        pool.erase(b).unwrap();
        assert!(!pool.has_excluded());
        assert_eq!(pool.pop_excluded(), None);
    }

    #[test]
    fn test_for_each_mut_visits_visible() {
        let mut pool = ChunkPool::new(64).unwrap();
        let a = pool.insert(2).unwrap();
        let b = pool.insert(2).unwrap();
        pool.set_active(b, false).unwrap();

        pool.for_each_mut(|_, bytes| bytes.fill(9));
        assert_eq!(pool.get(a).unwrap(), &[9, 9]);
        assert_eq!(pool.get(b).unwrap(), &[0, 0]);
    }

    #[test]
    fn test_display_dump() {
        let mut pool = ChunkPool::new(32).unwrap();
        let id = pool.insert(8).unwrap();
        pool.set_active(id, false).unwrap();

        let dump = pool.to_string();
        assert!(dump.contains("chunk 0: 8 used, 24 free, 1 locations"));
        assert!(dump.contains("#0 [0, 8) 8 bytes inactive"));
    }
}

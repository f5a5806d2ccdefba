//! # Region Pool
//!
//! Variable-size allocator over a single growable byte buffer.
//!
//! ## Layout
//!
//! ```text
//! buffer:  [ slot 0 ][free][ slot 2 ][ slot 1 ][   free (top)   ]
//!          0                                                    buffer_size
//! ```
//!
//! Every byte of the buffer belongs either to exactly one assigned slot or
//! to exactly one region of the [`FreeSpaceIndex`].
//!
//! ## Removal
//!
//! Removal is two-phase. [`RegionPool::remove`] only marks the slot and
//! queues it (O(1)). [`RegionPool::reclaim`] later returns queued regions to
//! free space in one batch, rebuilding the heap once.
//!
//! ## Views
//!
//! Byte views returned by [`RegionPool::get`] borrow the pool, so they cannot
//! outlive the next mutating call. Growth may move the whole buffer; always
//! re-fetch by handle after `insert`, `set`, `reserve`, `reclaim` or `shrink`.

use std::collections::VecDeque;

use bytemuck::Pod;
use tracing::{debug, trace};

use super::descriptor::{to_index, Region};
use super::free_space::FreeSpaceIndex;
use super::handle::SlotHandle;
use crate::config::RegionPoolConfig;
use crate::error::{PoolError, PoolResult};

/// One entry of the slot table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct Slot {
    /// Assigned region, or empty when the slot is unassigned.
    pub(super) region: Region,
    /// Bumped every time the slot is released.
    pub(super) generation: u32,
    /// Marked removed, waiting for [`RegionPool::reclaim`].
    pub(super) pending: bool,
}

impl Slot {
    #[inline]
    const fn is_live(&self) -> bool {
        !self.region.is_empty() && !self.pending
    }
}

/// A best-fit pool of variable-sized byte regions in one growable buffer.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust
/// use reservoir_core::RegionPool;
///
/// let mut pool = RegionPool::new(64);
/// let handle = pool.insert(12)?;
/// pool.get_mut(handle)?.copy_from_slice(b"hello, pool!");
/// assert_eq!(pool.get(handle)?, b"hello, pool!");
///
/// pool.remove(handle);
/// pool.reclaim(0);
/// assert!(pool.get(handle).is_err());
/// # Ok::<(), reservoir_core::PoolError>(())
/// ```
#[derive(Debug)]
pub struct RegionPool {
    /// Backing storage.
    pub(super) buffer: Vec<u8>,
    /// Minimum growth step of the buffer.
    pub(super) growth_granule: u64,
    /// Slot index -> assigned region.
    pub(super) slots: Vec<Slot>,
    /// Released slot indices, reused last-in first-out.
    pub(super) free_handles: Vec<u32>,
    /// All unassigned regions of `buffer`.
    pub(super) free_space: FreeSpaceIndex,
    /// Removed slots waiting for reclamation, oldest first.
    pub(super) pending: VecDeque<u32>,
    /// Assigned slot indices sorted by region offset.
    pub(super) live_order: Vec<u32>,
}

impl RegionPool {
    /// Creates an empty pool. No memory is allocated until the first insert.
    ///
    /// # Arguments
    ///
    /// * `growth_granule` - Minimum number of bytes the buffer grows by
    ///
    /// # Panics
    ///
    /// Panics if `growth_granule` is zero.
    #[must_use]
    pub fn new(growth_granule: u64) -> Self {
        assert!(growth_granule > 0, "Growth granule must be greater than zero");

        Self {
            buffer: Vec::new(),
            growth_granule,
            slots: Vec::new(),
            free_handles: Vec::new(),
            free_space: FreeSpaceIndex::new(),
            pending: VecDeque::new(),
            live_order: Vec::new(),
        }
    }

    /// Creates an empty pool from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured granule is zero; use
    /// [`PoolConfig::validate`](crate::PoolConfig::validate) first.
    #[must_use]
    pub fn from_config(config: &RegionPoolConfig) -> Self {
        Self::new(config.growth_granule)
    }

    /// Returns the buffer growth granule.
    #[inline]
    #[must_use]
    pub const fn growth_granule(&self) -> u64 {
        self.growth_granule
    }

    /// Changes the growth granule. Zero is ignored.
    pub fn set_growth_granule(&mut self, size: u64) {
        if size > 0 {
            self.growth_granule = size;
        }
    }

    /// Total buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Bytes held by assigned slots, including those pending removal.
    #[must_use]
    pub fn used_size(&self) -> u64 {
        self.slots.iter().map(|slot| slot.region.size).sum()
    }

    /// Bytes held by free regions.
    #[must_use]
    pub fn gap_size(&self) -> u64 {
        self.free_space.total()
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    /// Returns `true` if no handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of removals waiting for [`RegionPool::reclaim`].
    #[inline]
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.pending.len()
    }

    /// Free regions sorted by offset.
    #[must_use]
    pub fn free_regions(&self) -> Vec<Region> {
        self.free_space.sorted()
    }

    /// Regions of every assigned slot, including pending removals, sorted
    /// by offset.
    #[must_use]
    pub fn assigned_regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self
            .slots
            .iter()
            .map(|slot| slot.region)
            .filter(|region| !region.is_empty())
            .collect();
        regions.sort_unstable_by_key(|r| r.offset);
        regions
    }

    /// Returns `true` if `handle` refers to a live slot.
    #[must_use]
    pub fn contains(&self, handle: SlotHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Returns the region currently assigned to `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live.
    pub fn region(&self, handle: SlotHandle) -> PoolResult<Region> {
        let index = self.resolve(handle)?;
        Ok(self.slots[index].region)
    }

    /// Allocates a zero-filled region of `size` bytes and returns its handle.
    ///
    /// Released slot indices are reused most-recent first; the reused index
    /// comes back with a new generation.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::EmptyRequest`] for `size == 0`, or
    /// [`PoolError::AllocationFailed`] if the buffer cannot grow.
    pub fn insert(&mut self, size: u64) -> PoolResult<SlotHandle> {
        if size == 0 {
            return Err(PoolError::EmptyRequest);
        }

        let index = match self.free_handles.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    PoolError::AllocationFailed {
                        requested: self.total_size() + size,
                    }
                })?;
                self.slots.push(Slot::default());
                index
            }
        };

        if let Err(err) = self.assign(index as usize, size, false) {
            self.free_handles.push(index);
            return Err(err);
        }

        let handle = SlotHandle::new(index, self.slots[index as usize].generation);
        trace!(%handle, size, "region slot assigned");
        Ok(handle)
    }

    /// Resizes the region behind `handle`.
    ///
    /// A no-op when `size` is zero or equals the current size. With `copy`,
    /// the first `min(old, new)` bytes are carried over; all other bytes of
    /// the new region are zeroed. The handle itself stays valid.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live, or
    /// [`PoolError::AllocationFailed`] if the buffer cannot grow.
    pub fn set(&mut self, handle: SlotHandle, size: u64, copy: bool) -> PoolResult<()> {
        let index = self.resolve(handle)?;
        if size == 0 {
            return Ok(());
        }
        self.assign(index, size, copy)
    }

    /// Returns a view of the bytes behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live.
    pub fn get(&self, handle: SlotHandle) -> PoolResult<&[u8]> {
        let index = self.resolve(handle)?;
        Ok(&self.buffer[self.slots[index].region.span()])
    }

    /// Returns a mutable view of the bytes behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live.
    pub fn get_mut(&mut self, handle: SlotHandle) -> PoolResult<&mut [u8]> {
        let index = self.resolve(handle)?;
        let span = self.slots[index].region.span();
        Ok(&mut self.buffer[span])
    }

    /// Reads a plain-old-data value from the start of the region.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live, or
    /// [`PoolError::SizeMismatch`] if the region is smaller than `T`.
    pub fn read<T: Pod>(&self, handle: SlotHandle) -> PoolResult<T> {
        let bytes = self.get(handle)?;
        let expected = std::mem::size_of::<T>();
        if bytes.len() < expected {
            return Err(PoolError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..expected]))
    }

    /// Writes a plain-old-data value to the start of the region.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live, or
    /// [`PoolError::SizeMismatch`] if the region is smaller than `T`.
    pub fn write<T: Pod>(&mut self, handle: SlotHandle, value: &T) -> PoolResult<()> {
        let source = bytemuck::bytes_of(value);
        let bytes = self.get_mut(handle)?;
        if bytes.len() < source.len() {
            return Err(PoolError::SizeMismatch {
                expected: source.len(),
                actual: bytes.len(),
            });
        }
        bytes[..source.len()].copy_from_slice(source);
        Ok(())
    }

    /// Marks `handle` for deferred reclamation.
    ///
    /// The handle stops resolving immediately, but its region stays out of
    /// free space until [`RegionPool::reclaim`] runs. Returns `false` (and
    /// does nothing) if the handle was not live.
    pub fn remove(&mut self, handle: SlotHandle) -> bool {
        let Ok(index) = self.resolve(handle) else {
            return false;
        };

        self.slots[index].pending = true;
        #[allow(clippy::cast_possible_truncation)]
        self.pending.push_back(index as u32);
        true
    }

    /// Returns up to `limit` queued removals (all of them if `limit == 0`)
    /// to free space, oldest first, then tries to [`shrink`](Self::shrink).
    ///
    /// Returns the number of removals processed.
    pub fn reclaim(&mut self, limit: usize) -> usize {
        let count = if limit == 0 {
            self.pending.len()
        } else {
            limit.min(self.pending.len())
        };

        for index in self.pending.drain(..count) {
            let slot = &mut self.slots[index as usize];
            let region = slot.region;

            slot.region = Region::EMPTY;
            slot.pending = false;
            slot.generation = slot.generation.wrapping_add(1);

            self.free_space.insert(region, false);
            self.free_handles.push(index);
        }

        self.free_space.rebuild_heap();
        self.rebuild_live_order();

        debug!(
            processed = count,
            remaining = self.pending.len(),
            "reclaimed removed regions"
        );

        self.shrink(0);
        count
    }

    /// Ensures the free region at the top of the buffer spans at least
    /// `max(minimum, growth_granule)` bytes.
    ///
    /// The buffer only grows in whole granules, so its size stays a multiple
    /// of the granule it was grown with. Growth may move the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::AllocationFailed`] if the buffer cannot grow.
    pub fn reserve(&mut self, minimum: u64) -> PoolResult<()> {
        let target = minimum.max(self.growth_granule);
        let top = self.top_free_size();
        if top >= target {
            return Ok(());
        }

        let granules = (target - top).div_ceil(self.growth_granule);
        let bytes = granules
            .checked_mul(self.growth_granule)
            .ok_or(PoolError::AllocationFailed { requested: u64::MAX })?;
        self.grow(bytes)
    }

    /// Truncates the free region at the top of the buffer, one whole granule
    /// at a time, if that region spans at least one granule.
    ///
    /// Releases up to `maximum` bytes (capped at the top region), or as much
    /// of the top region as possible when `maximum == 0`, rounded down to
    /// whole granules. Returns the number of bytes released.
    pub fn shrink(&mut self, maximum: u64) -> u64 {
        let old_size = self.total_size();
        let Some(top) = self.free_space.ending_at(old_size) else {
            return 0;
        };

        let limit = if maximum == 0 {
            top.size
        } else {
            maximum.min(top.size)
        };
        let released = limit - limit % self.growth_granule;
        if released == 0 {
            return 0;
        }

        self.free_space.take(top);
        let (kept, _) = top.subtract(top.size - released);
        self.free_space.insert(kept, true);

        let new_size = old_size - released;
        self.buffer.truncate(to_index(new_size));
        self.buffer.shrink_to_fit();

        debug!(old_size, new_size, "region pool buffer shrunk");
        released
    }

    /// Releases the buffer and every assignment.
    ///
    /// Slot generations survive, so handles issued before the clear stay
    /// rejected afterwards.
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
        self.free_space.clear();
        self.pending.clear();
        self.live_order.clear();
        self.free_handles.clear();

        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if !slot.region.is_empty() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.region = Region::EMPTY;
            slot.pending = false;
            #[allow(clippy::cast_possible_truncation)]
            self.free_handles.push(index as u32);
        }
    }

    /// Iterates over live regions in ascending buffer-offset order.
    ///
    /// The iterator borrows the pool, so the pool cannot be mutated while
    /// it is alive. Call `iter` again to restart.
    #[must_use]
    pub fn iter(&self) -> RegionIter<'_> {
        RegionIter {
            pool: self,
            position: 0,
        }
    }

    /// Checks the coverage invariant: assigned and free regions partition
    /// `[0, total_size)` exactly, and no two free regions touch.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvariantViolation`] describing the first defect.
    pub fn validate(&self) -> PoolResult<()> {
        let free = self.free_space.sorted();
        for pair in free.windows(2) {
            if pair[0].end() >= pair[1].offset {
                return Err(PoolError::InvariantViolation(format!(
                    "free regions {} and {} are not coalesced",
                    pair[0], pair[1]
                )));
            }
        }

        let mut all = self.assigned_regions();
        all.extend(free);
        all.sort_unstable_by_key(|r| r.offset);

        let mut cursor = 0;
        for region in all {
            if region.offset != cursor {
                return Err(PoolError::InvariantViolation(format!(
                    "region {region} does not start at byte {cursor}"
                )));
            }
            cursor = region.end();
        }

        if cursor != self.total_size() {
            return Err(PoolError::InvariantViolation(format!(
                "regions cover {cursor} of {} bytes",
                self.total_size()
            )));
        }
        Ok(())
    }

    /// Size of the free region touching the top of the buffer, or zero.
    fn top_free_size(&self) -> u64 {
        self.free_space
            .ending_at(self.total_size())
            .map_or(0, |r| r.size)
    }

    /// Appends `bytes` zeroed bytes and hands them to free space.
    fn grow(&mut self, bytes: u64) -> PoolResult<()> {
        let old_size = self.total_size();
        let new_size = old_size
            .checked_add(bytes)
            .ok_or(PoolError::AllocationFailed { requested: u64::MAX })?;
        let additional = usize::try_from(bytes)
            .map_err(|_| PoolError::AllocationFailed { requested: new_size })?;

        self.buffer
            .try_reserve_exact(additional)
            .map_err(|_| PoolError::AllocationFailed { requested: new_size })?;
        self.buffer.resize(self.buffer.len() + additional, 0);

        self.free_space.insert(Region::new(old_size, bytes), true);
        debug!(old_size, new_size, "region pool buffer grown");
        Ok(())
    }

    /// Moves slot `index` to a fresh best-fit region of `size` bytes.
    fn assign(&mut self, index: usize, size: u64, copy: bool) -> PoolResult<()> {
        let old = self.slots[index].region;
        if old.size == size {
            return Ok(());
        }

        if self.free_space.largest() < size {
            self.reserve(size)?;
        }

        let Some(region) = self.free_space.best_fit(size) else {
            panic!("no free region of {size} bytes after reserve");
        };

        let carried = if copy { old.size.min(size) } else { 0 };
        if carried > 0 {
            let source = Region::new(old.offset, carried).span();
            self.buffer.copy_within(source, to_index(region.offset));
        }
        let fresh = Region::new(region.offset + carried, size - carried);
        self.buffer[fresh.span()].fill(0);

        self.free_space.insert(old, true);
        self.slots[index].region = region;
        self.rebuild_live_order();
        Ok(())
    }

    /// Resolves a handle to its slot index if it is live.
    fn resolve(&self, handle: SlotHandle) -> PoolResult<usize> {
        let index = handle.index() as usize;
        match self.slots.get(index) {
            Some(slot) if slot.is_live() && slot.generation == handle.generation() => Ok(index),
            _ => Err(PoolError::InvalidHandle {
                index: handle.index(),
                generation: handle.generation(),
            }),
        }
    }

    /// Rebuilds the offset-ordered listing of assigned slots.
    pub(super) fn rebuild_live_order(&mut self) {
        self.live_order.clear();
        #[allow(clippy::cast_possible_truncation)]
        self.live_order.extend(
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| !slot.region.is_empty())
                .map(|(index, _)| index as u32),
        );

        let slots = &self.slots;
        self.live_order
            .sort_unstable_by_key(|&index| slots[index as usize].region.offset);
    }
}

/// Offset-ordered iterator over the live regions of a [`RegionPool`].
///
/// Slots pending removal are skipped.
pub struct RegionIter<'a> {
    pool: &'a RegionPool,
    position: usize,
}

impl<'a> Iterator for RegionIter<'a> {
    type Item = (SlotHandle, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&index) = self.pool.live_order.get(self.position) {
            self.position += 1;

            let slot = &self.pool.slots[index as usize];
            if slot.is_live() {
                let handle = SlotHandle::new(index, slot.generation);
                return Some((handle, &self.pool.buffer[slot.region.span()]));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pool.live_order.len() - self.position))
    }
}

impl<'a> IntoIterator for &'a RegionPool {
    type Item = (SlotHandle, &'a [u8]);
    type IntoIter = RegionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

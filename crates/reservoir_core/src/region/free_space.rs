//! # Free-Space Index
//!
//! Tracks every unassigned region of a pool buffer twice:
//!
//! - a plain listing, used for coalescing and inspection
//! - a max-heap ordered by size, used for best-fit retrieval
//!
//! Mutations go through the listing; the heap is rebuilt from it (or the
//! listing from the heap) on demand, so a caller can batch many inserts
//! and pay for one heap rebuild.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::descriptor::Region;

/// Heap entry ordering regions by size.
///
/// Ties are broken by offset so that best-fit is deterministic and, among
/// equally sized candidates, settles on the lowest offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BySize(Region);

impl Ord for BySize {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .size
            .cmp(&other.0.size)
            .then_with(|| self.0.offset.cmp(&other.0.offset))
    }
}

impl PartialOrd for BySize {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Non-overlapping, fully coalesced free regions with a best-fit view.
#[derive(Debug, Default, Clone)]
pub struct FreeSpaceIndex {
    /// Plain listing of free regions.
    regions: Vec<Region>,
    /// Size-ordered view over `regions`.
    heap: BinaryHeap<BySize>,
    /// Set when `regions` changed without a heap rebuild.
    heap_stale: bool,
}

impl FreeSpaceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked free regions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no free space is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of all free region sizes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.regions.iter().map(|r| r.size).sum()
    }

    /// Size of the largest free region, or zero.
    #[must_use]
    pub fn largest(&self) -> u64 {
        self.regions.iter().map(|r| r.size).max().unwrap_or(0)
    }

    /// The free region ending exactly at `end`, if any.
    #[must_use]
    pub fn ending_at(&self, end: u64) -> Option<Region> {
        self.regions.iter().copied().find(|r| r.end() == end)
    }

    /// Iterates over the listing in its current (unspecified) order.
    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.iter().copied()
    }

    /// Returns the listing sorted by offset.
    #[must_use]
    pub fn sorted(&self) -> Vec<Region> {
        let mut sorted = self.regions.clone();
        sorted.sort_unstable_by_key(|r| r.offset);
        sorted
    }

    /// Adds a region, coalescing it with any adjacent free regions.
    ///
    /// Existing regions are already coalesced with each other, so the new
    /// region can absorb at most one neighbour per side and a single pass
    /// suffices. With `rebuild_heap == false` the heap is left stale until
    /// [`FreeSpaceIndex::rebuild_heap`] or the next [`FreeSpaceIndex::best_fit`].
    pub fn insert(&mut self, region: Region, rebuild_heap: bool) {
        if region.is_empty() {
            return;
        }

        let mut merged = region;
        self.regions.retain(|free| {
            debug_assert!(!free.overlaps(merged), "free region {free} overlaps {merged}");
            if free.is_adjacent(merged) {
                merged = merged.combine(*free);
                false
            } else {
                true
            }
        });
        self.regions.push(merged);

        if rebuild_heap {
            self.rebuild_heap();
        } else {
            self.heap_stale = true;
        }
    }

    /// Removes and returns the smallest free region of at least `size` bytes,
    /// trimmed to exactly `size`. Any remainder stays free.
    ///
    /// Pops the heap from the largest region down while regions still fit;
    /// the last one popped is the tightest fit. Everything else goes back.
    ///
    /// Returns `None` when no region is large enough.
    pub fn best_fit(&mut self, size: u64) -> Option<Region> {
        if self.heap_stale {
            self.rebuild_heap();
        }

        let mut larger: Vec<Region> = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.0.size < size {
                break;
            }
            larger.push(top.0);
            self.heap.pop();
        }

        let candidate = larger.pop()?;
        let (sized, remainder) = candidate.subtract(size);
        if !remainder.is_empty() {
            larger.push(remainder);
        }
        self.heap.extend(larger.into_iter().map(BySize));

        self.rebuild();
        Some(sized)
    }

    /// Removes exactly `region` from the listing if it is tracked.
    pub(crate) fn take(&mut self, region: Region) -> bool {
        let Some(position) = self.regions.iter().position(|r| *r == region) else {
            return false;
        };
        self.regions.swap_remove(position);
        self.rebuild_heap();
        true
    }

    /// Rebuilds the plain listing from the heap.
    pub fn rebuild(&mut self) {
        self.regions.clear();
        self.regions.extend(self.heap.iter().map(|entry| entry.0));
    }

    /// Rebuilds the heap from the plain listing.
    pub fn rebuild_heap(&mut self) {
        self.heap = self.regions.iter().copied().map(BySize).collect();
        self.heap_stale = false;
    }

    /// Drops all tracked regions.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.heap.clear();
        self.heap_stale = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(regions: &[Region]) -> FreeSpaceIndex {
        let mut index = FreeSpaceIndex::new();
        for region in regions {
            index.insert(*region, false);
        }
        index.rebuild_heap();
        index
    }

    #[test]
    fn test_best_fit_picks_smallest_sufficient() {
        let mut index = index_of(&[
            Region::new(0, 10),
            Region::new(20, 50),
            Region::new(80, 7),
            Region::new(100, 100),
        ]);

        let served = index.best_fit(8).unwrap();
        assert_eq!(served, Region::new(0, 8));

        let free = index.sorted();
        assert_eq!(
            free,
            vec![
                Region::new(8, 2),
                Region::new(20, 50),
                Region::new(80, 7),
                Region::new(100, 100),
            ]
        );
    }

    #[test]
    fn test_best_fit_exact_consumes_region() {
        let mut index = index_of(&[Region::new(0, 4), Region::new(10, 6)]);
        assert_eq!(index.best_fit(6), Some(Region::new(10, 6)));
        assert_eq!(index.sorted(), vec![Region::new(0, 4)]);
    }

    #[test]
    fn test_best_fit_insufficient() {
        let mut index = index_of(&[Region::new(0, 4)]);
        assert_eq!(index.best_fit(5), None);
        assert_eq!(index.sorted(), vec![Region::new(0, 4)]);
    }

    #[test]
    fn test_best_fit_tie_prefers_lowest_offset() {
        let mut index = index_of(&[Region::new(40, 8), Region::new(0, 8), Region::new(20, 8)]);
        assert_eq!(index.best_fit(8), Some(Region::new(0, 8)));
    }

    #[test]
    fn test_insert_coalesces_both_sides() {
        let mut index = index_of(&[Region::new(0, 5), Region::new(10, 5)]);
        index.insert(Region::new(5, 5), true);
        assert_eq!(index.sorted(), vec![Region::new(0, 15)]);
        assert_eq!(index.largest(), 15);
    }

    #[test]
    fn test_insert_without_neighbours() {
        let mut index = index_of(&[Region::new(0, 5)]);
        index.insert(Region::new(6, 2), true);
        assert_eq!(index.len(), 2);
        assert_eq!(index.total(), 7);
        assert_eq!(index.ending_at(8), Some(Region::new(6, 2)));
    }

    #[test]
    fn test_take() {
        let mut index = index_of(&[Region::new(0, 5), Region::new(9, 3)]);
        assert!(index.take(Region::new(9, 3)));
        assert!(!index.take(Region::new(9, 3)));
        assert_eq!(index.best_fit(3), Some(Region::new(0, 3)));
    }
}

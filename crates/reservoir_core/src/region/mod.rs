//! # Region Pool
//!
//! Best-fit allocation of variable-sized regions out of one growable buffer.
//!
//! ## Building Blocks
//!
//! - [`Region`]: `(offset, size)` descriptor with adjacency, combine, subtract
//! - [`FreeSpaceIndex`]: coalesced free regions plus a size-ordered max-heap
//! - [`RegionPool`]: slot table, deferred removal queue, offset-ordered iteration
//! - [`SlotHandle`]: generation-checked handle into the slot table

mod descriptor;
mod free_space;
mod handle;
mod persist;
mod pool;

pub use descriptor::Region;
pub use free_space::FreeSpaceIndex;
pub use handle::SlotHandle;
pub use pool::{RegionIter, RegionPool};

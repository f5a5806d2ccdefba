//! # Reservoir Core
//!
//! Memory-pool allocators for variable-size blocks:
//! - [`RegionPool`]: one growable buffer, best-fit placement, deferred removal
//! - [`ChunkPool`]: fixed-capacity chunks kept fully packed, stable ids
//!
//! ## Architecture Rules
//!
//! 1. **Handles, not pointers** - Callers hold [`SlotHandle`]s and [`ChunkId`]s;
//!    byte views borrow the pool and are re-fetched after mutation
//! 2. **Misuse is an error** - Stale or unknown handles return [`PoolError`]
//! 3. **Single-threaded** - No internal locking; one pool per thread
//!
//! ## Example
//!
//! ```rust
//! use reservoir_core::{ChunkPool, PoolConfig, RegionPool};
//!
//! let config = PoolConfig::default();
//! let mut regions = RegionPool::from_config(&config.region);
//! let mut chunks = ChunkPool::from_config(&config.chunk)?;
//!
//! let handle = regions.insert(16)?;
//! let id = chunks.insert(16)?;
//! regions.write(handle, &1u64)?;
//! chunks.write(id, &2u64)?;
//! # Ok::<(), reservoir_core::PoolError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod region;

pub use chunk::{Chunk, ChunkId, ChunkIter, ChunkPool, Location, LocationKey};
pub use config::{ChunkPoolConfig, PoolConfig, RegionPoolConfig};
pub use error::{PoolError, PoolResult};
pub use region::{FreeSpaceIndex, Region, RegionIter, RegionPool, SlotHandle};

//! # Chunk Pool
//!
//! Variable-size entries kept fully packed inside fixed-capacity chunks.
//!
//! ## Building Blocks
//!
//! - [`ChunkId`]: stable id handed to callers, reused last-in first-out
//! - [`LocationKey`]: packed `(chunk, location)` the id currently maps to
//! - [`Chunk`]: one packed segment with its offset-ordered location list
//! - [`ChunkPool`]: chunk list, id table, and exclusion stack

mod location;
mod pool;
mod segment;

pub use location::{ChunkId, Location, LocationKey};
pub use pool::{ChunkIter, ChunkPool};
pub use segment::{Chunk, Locations};

//! # Voxel Store
//!
//! This module contains the world data the rest of the engine reads from.
//!
//! ## Architecture
//!
//! * **Block**: raw block ids and the named types used by generation
//! * **Chunk**: the chunk grid and the per-chunk modification counters
//! * **World**: the dense block array, the height index and the shared handle
//!
//! ## Data Flow
//!
//! 1. The simulation thread writes blocks through `SharedWorld::set_block`
//! 2. The write bumps the modification id of every chunk whose geometry it affects
//! 3. The render cache notices the changed id and schedules a mesh rebuild
//! 4. A mesh worker copies a snapshot of the chunk under the read lock

pub mod block;
pub mod chunk;
pub mod world;

//! # Block Module
//!
//! Block identifiers as stored in the world's flat block array.
//!
//! For meshing purposes a block is reduced to a single question: is it air?
//! Everything else about a block (texture, material) belongs to the GPU side and
//! is looked up there from the raw id.

use block_type::BlockType;

pub mod block_type;

/// The underlying integer type used to represent block types in memory.
/// One of these is stored per voxel.
pub type BlockTypeSize = u8;

/// The id stored for empty space.
pub const AIR: BlockTypeSize = BlockType::AIR as BlockTypeSize;

/// Returns `true` if the raw id denotes empty space.
#[inline]
pub fn is_air(id: BlockTypeSize) -> bool {
    id == AIR
}

//! # Block Type Module
//!
//! This module defines the named block types used by world generation.
//! The world itself stores raw `BlockTypeSize` ids, so ids without a named
//! variant are still valid voxels.

use num_derive::FromPrimitive;

use super::BlockTypeSize;

/// Enumerates the named block types in the voxel world.
///
/// The discriminant is the id written into the block array. The `FromPrimitive`
/// derive allows going back from a raw id to a variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// Empty space. Never meshed.
    AIR = 0,

    /// A basic dirt block, used below the surface layer.
    DIRT = 1,

    /// The surface block of generated terrain.
    GRASS = 2,

    /// A wooden block.
    WOOD = 3,

    /// Deep terrain filler.
    STONE = 5,
}

impl BlockType {
    /// Converts a raw id to a `BlockType`.
    ///
    /// # Returns
    /// `None` if the id has no named variant.
    pub fn from_id(id: BlockTypeSize) -> Option<Self> {
        num::FromPrimitive::from_u8(id)
    }

    /// The raw id written into the block array for this type.
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// Picks the block type for a voxel of a generated column.
    ///
    /// # Arguments
    /// * `y` - Height of the voxel
    /// * `top` - Height of the column's topmost voxel
    pub fn for_terrain_layer(y: i32, top: i32) -> Self {
        match top - y {
            0 => BlockType::GRASS,
            1..=3 => BlockType::DIRT,
            _ => BlockType::STONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockType;

    #[test]
    fn ids_round_trip_through_from_primitive() {
        for block_type in [
            BlockType::AIR,
            BlockType::DIRT,
            BlockType::GRASS,
            BlockType::WOOD,
            BlockType::STONE,
        ] {
            assert_eq!(BlockType::from_id(block_type.id()), Some(block_type));
        }
        assert_eq!(BlockType::from_id(4), None);
        assert_eq!(BlockType::from_id(200), None);
    }

    #[test]
    fn terrain_layers_are_grass_then_dirt_then_stone() {
        assert_eq!(BlockType::for_terrain_layer(10, 10), BlockType::GRASS);
        assert_eq!(BlockType::for_terrain_layer(8, 10), BlockType::DIRT);
        assert_eq!(BlockType::for_terrain_layer(2, 10), BlockType::STONE);
    }
}

//! Read-only copy of the world data one chunk's mesh depends on.
//!
//! Workers capture a snapshot while holding the world read lock and release the
//! lock before any geometry math runs. The copy covers the chunk plus a one-column
//! border on every side (the "wrapped" chunk), which is everything both mesh
//! passes sample: neighbor heights for the top layer, the +X/+Z neighbor for side
//! faces, and the 3D cells around each face for occlusion.

use bitvec::vec::BitVec;

use crate::{
    engine_state::voxels::world::VoxelWorld,
    error::WorldError,
};

/// Height assumed for columns beyond the world's edge. The world is treated as
/// if it were bordered by ground level.
pub const OUTSIDE_WORLD_HEIGHT: i32 = 0;

/// Heights and block solidity for a chunk and its one-column border.
pub struct ChunkSnapshot {
    /// Index of the chunk this snapshot was taken for
    pub chunk_index: usize,
    /// Modification id of the chunk at capture time
    pub modification_id: u32,
    chunk_size: i32,
    wrapped_size: i32,
    max_height: i32,
    /// Column heights, row-major along X, including the border
    heights: Vec<i32>,
    /// One bit per cell of the wrapped chunk for `0..=max_height`, laid out `[y][z][x]`
    solid: BitVec,
}

impl ChunkSnapshot {
    /// Copies the data for one chunk out of the world.
    ///
    /// Must be called while holding the world lock when the world is shared.
    ///
    /// # Errors
    /// `WorldError::InvalidChunkIndex` if the chunk does not exist.
    pub fn capture(world: &VoxelWorld, chunk_index: usize) -> Result<Self, WorldError> {
        let grid = world.grid();
        let (origin_x, origin_z) = grid.chunk_origin(chunk_index)?;
        let modification_id = world.modification_id(chunk_index)?;
        let chunk_size = grid.chunk_size;
        let wrapped_size = chunk_size + 2;

        let mut heights = Vec::with_capacity((wrapped_size * wrapped_size) as usize);
        for pz in 0..wrapped_size {
            for px in 0..wrapped_size {
                heights.push(world.get_highest_block_height_or(
                    origin_x + px - 1,
                    origin_z + pz - 1,
                    OUTSIDE_WORLD_HEIGHT,
                ));
            }
        }
        let max_height = heights.iter().copied().max().unwrap_or(OUTSIDE_WORLD_HEIGHT);

        let mut solid = BitVec::with_capacity(((max_height + 1) * wrapped_size * wrapped_size).max(0) as usize);
        for y in 0..=max_height {
            for pz in 0..wrapped_size {
                for px in 0..wrapped_size {
                    let x = origin_x + px - 1;
                    let z = origin_z + pz - 1;
                    let cell_solid = if world.contains_column(x, z) {
                        world.is_solid(x, y, z)
                    } else {
                        y <= OUTSIDE_WORLD_HEIGHT
                    };
                    solid.push(cell_solid);
                }
            }
        }

        Ok(Self {
            chunk_index,
            modification_id,
            chunk_size,
            wrapped_size,
            max_height,
            heights,
            solid,
        })
    }

    /// Side length of the chunk (without the border).
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// Height of a column in chunk-local coordinates. `-1` and `chunk_size` address
    /// the border columns.
    ///
    /// # Panics
    /// Panics if the column is outside the wrapped chunk.
    pub fn height(&self, local_x: i32, local_z: i32) -> i32 {
        self.heights[self.wrapped_column(local_x, local_z)]
    }

    /// Solidity of a cell in chunk-local coordinates. Cells below the world or
    /// above every copied column are air.
    pub fn is_solid(&self, local_x: i32, y: i32, local_z: i32) -> bool {
        if y < 0 || y > self.max_height {
            return false;
        }
        let plane = (self.wrapped_size * self.wrapped_size) as usize;
        self.solid[y as usize * plane + self.wrapped_column(local_x, local_z)]
    }

    #[inline]
    fn wrapped_column(&self, local_x: i32, local_z: i32) -> usize {
        debug_assert!((-1..=self.chunk_size).contains(&local_x));
        debug_assert!((-1..=self.chunk_size).contains(&local_z));
        ((local_z + 1) * self.wrapped_size + (local_x + 1)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkSnapshot, OUTSIDE_WORLD_HEIGHT};
    use crate::{
        engine_state::voxels::world::{VoxelWorld, EMPTY_COLUMN},
        error::WorldError,
    };

    #[test]
    fn border_columns_come_from_neighbor_chunks() {
        let mut world = VoxelWorld::new(8, 8, 8, 4).unwrap();
        world.set_block(4, 3, 1, 1).unwrap();
        let snapshot = ChunkSnapshot::capture(&world, 0).unwrap();

        assert_eq!(snapshot.height(4, 1), 3);
        assert!(snapshot.is_solid(4, 3, 1));
        assert_eq!(snapshot.height(3, 1), EMPTY_COLUMN);
    }

    #[test]
    fn outside_world_reads_as_ground_level() {
        let world = VoxelWorld::new(4, 4, 4, 4).unwrap();
        let snapshot = ChunkSnapshot::capture(&world, 0).unwrap();

        assert_eq!(snapshot.height(-1, 0), OUTSIDE_WORLD_HEIGHT);
        assert!(snapshot.is_solid(-1, 0, 2));
        assert!(!snapshot.is_solid(-1, 1, 2));
        assert!(!snapshot.is_solid(0, -1, 0));
    }

    #[test]
    fn capture_records_the_modification_id() {
        let mut world = VoxelWorld::new(4, 4, 4, 2).unwrap();
        world.set_block(0, 0, 0, 1).unwrap();
        let snapshot = ChunkSnapshot::capture(&world, 0).unwrap();
        assert_eq!(snapshot.modification_id, world.modification_id(0).unwrap());
        assert_eq!(
            ChunkSnapshot::capture(&world, 4).err(),
            Some(WorldError::InvalidChunkIndex(4))
        );
    }
}

//! # World Module
//!
//! This module provides `VoxelWorld`, the dense columnar block store, and
//! `SharedWorld`, the handle used to pass it between threads.
//!
//! ## Storage
//!
//! - `blocks`: one `BlockTypeSize` per voxel, laid out `[y][x][z]`
//! - `height_index`: one entry per column, laid out `[x][z]`, holding the y of the
//!   topmost non-air voxel or `EMPTY_COLUMN`
//! - `modification_ids`: one atomic counter per chunk (see `ChunkModificationIds`)
//!
//! The world is created once at a fixed size and never resized.
//!
//! ## Thread Safety
//!
//! A single write touches the block array and the height index in two steps, so
//! readers on other threads must hold the `SharedWorld` read guard to avoid seeing
//! the intermediate state. Modification ids are the exception: they are atomics
//! and can be probed without the lock.

use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use log::info;
use noise::{NoiseFn, Perlin};

use crate::{
    config::GenerationMethod,
    core::MtResource,
    error::WorldError,
};

use super::{
    block::{block_type::BlockType, is_air, BlockTypeSize, AIR},
    chunk::{ChunkGrid, ChunkModificationIds},
};

/// Height index value of a column containing only air.
pub const EMPTY_COLUMN: i32 = -1;

/// Maximum world height. Side-layer records store a face's base height in a byte.
pub const MAX_WORLD_HEIGHT: i32 = 256;

/// Offset of an in-world voxel in a `[y][x][z]` block array.
///
/// Computed in `usize`; the product passes `i32::MAX` well before a world gets
/// too large to allocate.
#[inline]
fn voxel_offset(size_x: i32, size_z: i32, x: i32, y: i32, z: i32) -> usize {
    (y as usize * size_x as usize + x as usize) * size_z as usize + z as usize
}

/// Dense voxel storage with a derived per-column height index.
pub struct VoxelWorld {
    size_x: i32,
    size_y: i32,
    size_z: i32,
    grid: ChunkGrid,
    blocks: Vec<BlockTypeSize>,
    height_index: Vec<i32>,
    modification_ids: ChunkModificationIds,
}

impl VoxelWorld {
    /// Creates an all-air world.
    ///
    /// # Arguments
    /// * `size_x`, `size_y`, `size_z` - World dimensions in blocks
    /// * `chunk_size` - Side length of a chunk; `size_x` and `size_z` must be multiples of it
    ///
    /// # Errors
    /// `WorldError::InvalidDimensions` for a non-positive height, a height above
    /// `MAX_WORLD_HEIGHT`, or X/Z sizes that do not divide into chunks.
    pub fn new(size_x: i32, size_y: i32, size_z: i32, chunk_size: i32) -> Result<Self, WorldError> {
        if !(1..=MAX_WORLD_HEIGHT).contains(&size_y) {
            return Err(WorldError::InvalidDimensions(format!(
                "world height {size_y} must be within 1..={MAX_WORLD_HEIGHT}"
            )));
        }
        let grid = ChunkGrid::new(size_x, size_z, chunk_size)?;
        let volume = (size_x as usize)
            .checked_mul(size_y as usize)
            .and_then(|slab| slab.checked_mul(size_z as usize))
            .ok_or_else(|| {
                WorldError::InvalidDimensions(format!(
                    "{size_x}x{size_y}x{size_z} world does not fit in memory"
                ))
            })?;

        Ok(Self {
            size_x,
            size_y,
            size_z,
            grid,
            blocks: vec![AIR; volume],
            height_index: vec![EMPTY_COLUMN; size_x as usize * size_z as usize],
            modification_ids: ChunkModificationIds::new(grid.chunk_count()),
        })
    }

    /// World dimensions `(size_x, size_y, size_z)`.
    pub fn size(&self) -> (i32, i32, i32) {
        (self.size_x, self.size_y, self.size_z)
    }

    /// The chunk grid laid over this world.
    pub fn grid(&self) -> ChunkGrid {
        self.grid
    }

    /// The shared per-chunk modification counters.
    pub fn modification_ids(&self) -> &ChunkModificationIds {
        &self.modification_ids
    }

    /// Current modification id of a chunk.
    pub fn modification_id(&self, chunk_index: usize) -> Result<u32, WorldError> {
        self.modification_ids.get(chunk_index)
    }

    /// Raw block ids, laid out `[y][x][z]`.
    pub fn blocks(&self) -> &[BlockTypeSize] {
        &self.blocks
    }

    /// Raw height index, laid out `[x][z]`.
    pub fn height_index(&self) -> &[i32] {
        &self.height_index
    }

    /// Returns `true` if the voxel coordinate lies inside the world.
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        self.contains_column(x, z) && (0..self.size_y).contains(&y)
    }

    /// Returns `true` if the column lies inside the world.
    pub fn contains_column(&self, x: i32, z: i32) -> bool {
        (0..self.size_x).contains(&x) && (0..self.size_z).contains(&z)
    }

    #[inline]
    fn block_offset(&self, x: i32, y: i32, z: i32) -> usize {
        voxel_offset(self.size_x, self.size_z, x, y, z)
    }

    #[inline]
    fn column_offset(&self, x: i32, z: i32) -> usize {
        x as usize * self.size_z as usize + z as usize
    }

    /// Reads the block id at a voxel.
    ///
    /// # Errors
    /// `WorldError::OutOfRange` if the coordinate lies outside the world.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<BlockTypeSize, WorldError> {
        if !self.contains(x, y, z) {
            return Err(WorldError::OutOfRange { x, y, z });
        }
        Ok(self.blocks[self.block_offset(x, y, z)])
    }

    /// Returns `true` if the voxel holds a non-air block. Outside the world is air.
    pub fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.contains(x, y, z) && !is_air(self.blocks[self.block_offset(x, y, z)])
    }

    /// Writes a block id and keeps the height index and modification ids consistent.
    ///
    /// The height index is raised directly when a solid block lands above the
    /// current top. When the top block itself is removed, the column is scanned
    /// downward from the old top to find the new one. Any other write leaves the
    /// height index untouched.
    ///
    /// The chunk containing the voxel and every chunk across a boundary the voxel
    /// touches get their modification id bumped, because seam geometry and corner
    /// occlusion in those chunks read this column.
    ///
    /// # Errors
    /// `WorldError::OutOfRange` if the coordinate lies outside the world. Nothing
    /// is modified in that case.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockTypeSize) -> Result<(), WorldError> {
        if !self.contains(x, y, z) {
            return Err(WorldError::OutOfRange { x, y, z });
        }

        let block_offset = self.block_offset(x, y, z);
        self.blocks[block_offset] = id;

        let column_offset = self.column_offset(x, z);
        let top = self.height_index[column_offset];
        if !is_air(id) {
            if y > top {
                self.height_index[column_offset] = y;
            }
        } else if y == top {
            let mut new_top = y - 1;
            while new_top >= 0 && is_air(self.blocks[self.block_offset(x, new_top, z)]) {
                new_top -= 1;
            }
            self.height_index[column_offset] = new_top.max(EMPTY_COLUMN);
        }

        self.bump_chunks_touching(x, z);
        Ok(())
    }

    fn bump_chunks_touching(&self, x: i32, z: i32) {
        for chunk_index in self.grid.chunks_touching_column(x, z) {
            self.modification_ids.bump(chunk_index);
        }
        self.modification_ids.bump_world_version();
    }

    /// Height of the topmost non-air voxel in a column, or `EMPTY_COLUMN`.
    ///
    /// # Errors
    /// `WorldError::ColumnOutOfRange` if the column lies outside the world.
    pub fn get_highest_block_height(&self, x: i32, z: i32) -> Result<i32, WorldError> {
        if !self.contains_column(x, z) {
            return Err(WorldError::ColumnOutOfRange { x, z });
        }
        Ok(self.height_index[self.column_offset(x, z)])
    }

    /// Like `get_highest_block_height`, but returns `EMPTY_COLUMN` outside the world.
    pub fn get_highest_block_height_safe(&self, x: i32, z: i32) -> i32 {
        self.get_highest_block_height_or(x, z, EMPTY_COLUMN)
    }

    /// Like `get_highest_block_height`, but returns `default` outside the world.
    pub fn get_highest_block_height_or(&self, x: i32, z: i32, default: i32) -> i32 {
        if self.contains_column(x, z) {
            self.height_index[self.column_offset(x, z)]
        } else {
            default
        }
    }

    /// Replaces a whole column with terrain layers from `0` up to `top`.
    ///
    /// Used by world generation; bumps the touched chunks once instead of once
    /// per voxel.
    ///
    /// # Errors
    /// `WorldError::ColumnOutOfRange` if the column lies outside the world.
    pub fn fill_column(&mut self, x: i32, z: i32, top: i32) -> Result<(), WorldError> {
        if !self.contains_column(x, z) {
            return Err(WorldError::ColumnOutOfRange { x, z });
        }
        let top = top.clamp(EMPTY_COLUMN, self.size_y - 1);
        for y in 0..self.size_y {
            let id = if y <= top {
                BlockType::for_terrain_layer(y, top).id()
            } else {
                AIR
            };
            let block_offset = self.block_offset(x, y, z);
            self.blocks[block_offset] = id;
        }
        let column_offset = self.column_offset(x, z);
        self.height_index[column_offset] = top;
        self.bump_chunks_touching(x, z);
        Ok(())
    }

    /// Fills the whole world using one of the generation strategies.
    ///
    /// Possible strategies:
    /// - `Perlin`: rolling terrain from 2D Perlin noise
    /// - `Flat`: every column filled up to the same height
    /// - `Empty`: leaves the world as air
    pub fn generate(&mut self, method: &GenerationMethod) -> Result<(), WorldError> {
        let start_time = web_time::Instant::now();
        match *method {
            GenerationMethod::Perlin {
                seed,
                scale,
                base_height,
                amplitude,
            } => {
                let perlin = Perlin::new(seed);
                for x in 0..self.size_x {
                    for z in 0..self.size_z {
                        let sample = perlin.get([x as f64 * scale, z as f64 * scale]);
                        let top = (base_height as f64 + sample * amplitude as f64).round() as i32;
                        self.fill_column(x, z, top)?;
                    }
                }
            }
            GenerationMethod::Flat { height } => {
                for x in 0..self.size_x {
                    for z in 0..self.size_z {
                        self.fill_column(x, z, height)?;
                    }
                }
            }
            GenerationMethod::Empty => {}
        }
        info!(
            "Generated {}x{}x{} world with {:?} in {:?}",
            self.size_x,
            self.size_y,
            self.size_z,
            method,
            start_time.elapsed()
        );
        Ok(())
    }

    /// Wraps the world for sharing across threads.
    pub fn share(self) -> SharedWorld {
        SharedWorld::new(self)
    }
}

/// A cloneable handle to a `VoxelWorld` living behind the world lock.
///
/// Every clone refers to the same memory; passing a clone to another thread is the
/// "hand the world to a worker" operation. The modification counters and grid are
/// cached outside the lock so staleness can be probed without blocking.
#[derive(Clone)]
pub struct SharedWorld {
    world: MtResource<VoxelWorld>,
    modification_ids: ChunkModificationIds,
    grid: ChunkGrid,
}

impl SharedWorld {
    /// Moves a world behind the lock.
    pub fn new(world: VoxelWorld) -> Self {
        let modification_ids = world.modification_ids.clone();
        let grid = world.grid;
        Self {
            world: MtResource::new(world),
            modification_ids,
            grid,
        }
    }

    /// Takes the world read lock.
    pub fn read(&self) -> RwLockReadGuard<'_, VoxelWorld> {
        self.world.get()
    }

    /// Takes the world write lock. Only the simulation thread should do this.
    pub fn write(&self) -> RwLockWriteGuard<'_, VoxelWorld> {
        self.world.get_mut()
    }

    /// Writes a single block under the write lock.
    pub fn set_block(&self, x: i32, y: i32, z: i32, id: BlockTypeSize) -> Result<(), WorldError> {
        self.world.get_mut().set_block(x, y, z, id)
    }

    /// Lock-free read of a chunk's modification id.
    pub fn modification_id(&self, chunk_index: usize) -> Result<u32, WorldError> {
        self.modification_ids.get(chunk_index)
    }

    /// The lock-free modification counters.
    pub fn modification_ids(&self) -> &ChunkModificationIds {
        &self.modification_ids
    }

    /// The chunk grid of the shared world.
    pub fn grid(&self) -> ChunkGrid {
        self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::{voxel_offset, VoxelWorld, EMPTY_COLUMN};
    use crate::{config::GenerationMethod, error::WorldError};

    fn recomputed_height(world: &VoxelWorld, x: i32, z: i32) -> i32 {
        let (_, size_y, _) = world.size();
        (0..size_y)
            .rev()
            .find(|&y| world.is_solid(x, y, z))
            .unwrap_or(EMPTY_COLUMN)
    }

    #[test]
    fn height_index_matches_recomputation_after_random_writes() {
        let mut world = VoxelWorld::new(8, 12, 8, 4).unwrap();
        let mut rng = fastrand::Rng::with_seed(0x5eed);

        for _ in 0..4000 {
            let x = rng.i32(0..8);
            let y = rng.i32(0..12);
            let z = rng.i32(0..8);
            let id = if rng.bool() { 0 } else { rng.u8(1..6) };
            world.set_block(x, y, z, id).unwrap();
        }

        for x in 0..8 {
            for z in 0..8 {
                assert_eq!(
                    world.get_highest_block_height(x, z).unwrap(),
                    recomputed_height(&world, x, z),
                    "column ({x}, {z})"
                );
            }
        }
    }

    #[test]
    fn removing_the_top_exposes_the_block_below() {
        let mut world = VoxelWorld::new(4, 8, 4, 4).unwrap();
        world.set_block(1, 2, 1, 1).unwrap();
        world.set_block(1, 5, 1, 1).unwrap();
        assert_eq!(world.get_highest_block_height(1, 1), Ok(5));

        world.set_block(1, 5, 1, 0).unwrap();
        assert_eq!(world.get_highest_block_height(1, 1), Ok(2));

        world.set_block(1, 2, 1, 0).unwrap();
        assert_eq!(world.get_highest_block_height(1, 1), Ok(EMPTY_COLUMN));
    }

    #[test]
    fn removing_below_the_top_keeps_the_height() {
        let mut world = VoxelWorld::new(4, 8, 4, 4).unwrap();
        world.set_block(0, 1, 0, 1).unwrap();
        world.set_block(0, 4, 0, 1).unwrap();
        world.set_block(0, 1, 0, 0).unwrap();
        assert_eq!(world.get_highest_block_height(0, 0), Ok(4));
    }

    #[test]
    fn out_of_range_writes_fail_and_change_nothing() {
        let mut world = VoxelWorld::new(4, 4, 4, 2).unwrap();
        let before = world.modification_ids().snapshot();
        assert_eq!(
            world.set_block(4, 0, 0, 1),
            Err(WorldError::OutOfRange { x: 4, y: 0, z: 0 })
        );
        assert_eq!(
            world.set_block(0, -1, 0, 1),
            Err(WorldError::OutOfRange { x: 0, y: -1, z: 0 })
        );
        assert_eq!(world.modification_ids().snapshot(), before);
        assert_eq!(
            world.get_highest_block_height(-1, 0),
            Err(WorldError::ColumnOutOfRange { x: -1, z: 0 })
        );
        assert_eq!(world.get_highest_block_height_safe(-1, 0), EMPTY_COLUMN);
        assert_eq!(world.get_highest_block_height_or(0, 9, 0), 0);
    }

    #[test]
    fn corner_write_bumps_own_chunk_only() {
        // 4x4 chunks of side 2; column (0, 0) has no neighbors across its boundaries.
        let mut world = VoxelWorld::new(8, 4, 8, 2).unwrap();
        world.set_block(0, 0, 0, 1).unwrap();
        let before = world.modification_ids().snapshot();

        world.set_block(0, 1, 0, 1).unwrap();
        let after = world.modification_ids().snapshot();

        let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
        assert_eq!(changed, vec![0]);
        assert!(after[0] > before[0]);
    }

    #[test]
    fn write_on_west_edge_bumps_west_neighbor() {
        let mut world = VoxelWorld::new(8, 4, 8, 2).unwrap();
        let grid = world.grid();
        let before = world.modification_ids().snapshot();

        // x = 2 is local x 0 of chunk (1, 0); z = 0 sits on the world's north edge.
        world.set_block(2, 1, 0, 1).unwrap();
        let after = world.modification_ids().snapshot();

        let mut changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
        changed.sort_unstable();
        let mut expected = vec![grid.chunk_index(1, 0).unwrap(), grid.chunk_index(0, 0).unwrap()];
        expected.sort_unstable();
        assert_eq!(changed, expected);
    }

    #[test]
    fn every_write_bumps_exactly_the_touching_chunks() {
        let mut world = VoxelWorld::new(12, 4, 12, 4).unwrap();
        let grid = world.grid();
        let mut rng = fastrand::Rng::with_seed(99);

        for _ in 0..200 {
            let (x, y, z) = (rng.i32(0..12), rng.i32(0..4), rng.i32(0..12));
            let before = world.modification_ids().snapshot();
            world.set_block(x, y, z, rng.u8(0..3)).unwrap();
            let after = world.modification_ids().snapshot();

            let touching = grid.chunks_touching_column(x, z);
            for index in 0..before.len() {
                if touching.contains(&index) {
                    assert!(after[index] > before[index]);
                } else {
                    assert_eq!(after[index], before[index]);
                }
            }
        }
    }

    #[test]
    fn flat_generation_fills_every_column() {
        let mut world = VoxelWorld::new(8, 8, 8, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 3 }).unwrap();
        for x in 0..8 {
            for z in 0..8 {
                assert_eq!(world.get_highest_block_height(x, z), Ok(3));
                assert!(world.is_solid(x, 0, z));
                assert!(!world.is_solid(x, 4, z));
            }
        }
        assert!(world.modification_ids().snapshot().iter().all(|&id| id > 0));
    }

    #[test]
    fn perlin_generation_keeps_heights_in_range() {
        let mut world = VoxelWorld::new(16, 32, 16, 8).unwrap();
        world
            .generate(&GenerationMethod::Perlin {
                seed: 3,
                scale: 0.05,
                base_height: 16,
                amplitude: 40,
            })
            .unwrap();
        for x in 0..16 {
            for z in 0..16 {
                let height = world.get_highest_block_height(x, z).unwrap();
                assert!((EMPTY_COLUMN..32).contains(&height));
                assert_eq!(height, recomputed_height(&world, x, z));
            }
        }
    }

    #[test]
    fn shared_world_exposes_ids_without_locking() {
        let world = VoxelWorld::new(4, 4, 4, 2).unwrap().share();
        let reader = world.clone();
        let _guard = reader.read();
        assert_eq!(world.modification_id(3), Ok(0));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn offsets_of_large_worlds_do_not_wrap() {
        // 8192 x 256 x 8192 holds 2^34 voxels.
        assert_eq!(voxel_offset(8192, 8192, 8191, 255, 8191), (1 << 34) - 1);
        assert_eq!(voxel_offset(8192, 8192, 0, 128, 0), 1 << 33);
    }
}

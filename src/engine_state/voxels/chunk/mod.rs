//! # Chunk Module
//!
//! Chunks are fixed-size square regions of the world's XZ plane. They are the unit
//! of mesh rebuilds and of visibility testing; the world itself stores blocks in
//! one dense array and only uses the chunk grid for bookkeeping.
//!
//! This module provides:
//! - `ChunkGrid`: conversions between columns, chunk coordinates and chunk indices
//! - `ChunkModificationIds`: one atomic counter per chunk, readable without the world lock
//!
//! Chunk indices are laid out row-major along X: `index = cz * chunks_x + cx`.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use crate::error::WorldError;

/// The default side length of a chunk in blocks.
pub const DEFAULT_CHUNK_SIZE: i32 = 16;

/// The largest supported chunk side. Side-layer records address a column with a
/// 12-bit linear index, so a chunk may hold at most 4096 columns.
pub const MAX_CHUNK_SIZE: i32 = 64;

/// Geometry of the chunk grid laid over a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGrid {
    /// Side length of a chunk in blocks
    pub chunk_size: i32,
    /// Number of chunks along X
    pub chunks_x: i32,
    /// Number of chunks along Z
    pub chunks_z: i32,
}

impl ChunkGrid {
    /// Creates the grid for a world of `size_x` × `size_z` columns.
    ///
    /// # Errors
    /// `WorldError::InvalidDimensions` if the chunk size is outside `1..=MAX_CHUNK_SIZE`
    /// or the world does not divide evenly into chunks.
    pub fn new(size_x: i32, size_z: i32, chunk_size: i32) -> Result<Self, WorldError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(WorldError::InvalidDimensions(format!(
                "chunk size {chunk_size} must be within 1..={MAX_CHUNK_SIZE}"
            )));
        }
        if size_x <= 0 || size_z <= 0 || size_x % chunk_size != 0 || size_z % chunk_size != 0 {
            return Err(WorldError::InvalidDimensions(format!(
                "world {size_x}x{size_z} is not a positive multiple of chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunks_x: size_x / chunk_size,
            chunks_z: size_z / chunk_size,
        })
    }

    /// Total number of chunks in the grid.
    pub fn chunk_count(&self) -> usize {
        (self.chunks_x * self.chunks_z) as usize
    }

    /// Number of columns in a single chunk.
    pub fn columns_per_chunk(&self) -> usize {
        (self.chunk_size * self.chunk_size) as usize
    }

    /// Returns the index of the chunk at chunk coordinates `(cx, cz)`, if it exists.
    pub fn chunk_index(&self, cx: i32, cz: i32) -> Option<usize> {
        if cx < 0 || cz < 0 || cx >= self.chunks_x || cz >= self.chunks_z {
            return None;
        }
        Some((cz * self.chunks_x + cx) as usize)
    }

    /// Returns the chunk coordinates of a chunk index.
    ///
    /// # Errors
    /// `WorldError::InvalidChunkIndex` if the index is past the end of the grid.
    pub fn chunk_coords(&self, index: usize) -> Result<(i32, i32), WorldError> {
        if index >= self.chunk_count() {
            return Err(WorldError::InvalidChunkIndex(index));
        }
        let index = index as i32;
        Ok((index % self.chunks_x, index / self.chunks_x))
    }

    /// Returns the world column at the chunk's minimum X/Z corner.
    pub fn chunk_origin(&self, index: usize) -> Result<(i32, i32), WorldError> {
        let (cx, cz) = self.chunk_coords(index)?;
        Ok((cx * self.chunk_size, cz * self.chunk_size))
    }

    /// Chunk coordinates containing world column `(x, z)`. May lie outside the grid.
    pub fn chunk_of_column(&self, x: i32, z: i32) -> (i32, i32) {
        (x.div_euclid(self.chunk_size), z.div_euclid(self.chunk_size))
    }

    /// Every chunk whose geometry depends on column `(x, z)`.
    ///
    /// That is the chunk containing the column, plus the chunk across each X/Z
    /// boundary the column touches, plus the diagonal chunk when the column sits
    /// on a chunk corner. Chunks outside the grid are skipped.
    pub fn chunks_touching_column(&self, x: i32, z: i32) -> Vec<usize> {
        let (cx, cz) = self.chunk_of_column(x, z);
        let local_x = x.rem_euclid(self.chunk_size);
        let local_z = z.rem_euclid(self.chunk_size);

        let x_offsets = Self::boundary_offsets(local_x, self.chunk_size);
        let z_offsets = Self::boundary_offsets(local_z, self.chunk_size);

        let mut touched = Vec::with_capacity(4);
        for dz in z_offsets.iter().flatten() {
            for dx in x_offsets.iter().flatten() {
                if let Some(index) = self.chunk_index(cx + dx, cz + dz) {
                    touched.push(index);
                }
            }
        }
        touched
    }

    fn boundary_offsets(local: i32, chunk_size: i32) -> [Option<i32>; 3] {
        [
            Some(0),
            (local == 0).then_some(-1),
            (local == chunk_size - 1).then_some(1),
        ]
    }
}

/// Per-chunk modification counters shared between every holder of the world.
///
/// Counters only ever increase. Readers on other threads may load them at any
/// time without taking the world lock; a changed value is the cheap "this chunk
/// is stale" probe used by the render cache.
#[derive(Debug, Clone)]
pub struct ChunkModificationIds {
    ids: Arc<[AtomicU32]>,
    world_version: Arc<AtomicU64>,
}

impl ChunkModificationIds {
    /// Creates `chunk_count` counters, all starting at zero.
    pub fn new(chunk_count: usize) -> Self {
        Self {
            ids: (0..chunk_count).map(|_| AtomicU32::new(0)).collect(),
            world_version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no chunks.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Current modification id of a chunk.
    ///
    /// # Errors
    /// `WorldError::InvalidChunkIndex` for an index past the end.
    pub fn get(&self, index: usize) -> Result<u32, WorldError> {
        self.ids
            .get(index)
            .map(|id| id.load(Ordering::Acquire))
            .ok_or(WorldError::InvalidChunkIndex(index))
    }

    /// Increments a chunk's modification id. Indices past the end are ignored.
    pub fn bump(&self, index: usize) {
        if let Some(id) = self.ids.get(index) {
            id.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Copies every counter. Used by tests and the statistics readout.
    pub fn snapshot(&self) -> Vec<u32> {
        self.ids.iter().map(|id| id.load(Ordering::Acquire)).collect()
    }

    /// Number of block writes applied to the world so far.
    pub fn world_version(&self) -> u64 {
        self.world_version.load(Ordering::Acquire)
    }

    pub(crate) fn bump_world_version(&self) {
        self.world_version.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkGrid, ChunkModificationIds};
    use crate::error::WorldError;

    #[test]
    fn grid_rejects_uneven_worlds() {
        assert!(matches!(
            ChunkGrid::new(10, 8, 4),
            Err(WorldError::InvalidDimensions(_))
        ));
        assert!(matches!(
            ChunkGrid::new(128, 128, 65),
            Err(WorldError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn index_and_coords_agree() {
        let grid = ChunkGrid::new(8, 12, 2).unwrap();
        assert_eq!((grid.chunks_x, grid.chunks_z), (4, 6));
        assert_eq!(grid.chunk_count(), 24);
        for index in 0..grid.chunk_count() {
            let (cx, cz) = grid.chunk_coords(index).unwrap();
            assert_eq!(grid.chunk_index(cx, cz), Some(index));
        }
        assert_eq!(grid.chunk_index(-1, 0), None);
        assert_eq!(grid.chunk_index(4, 0), None);
        assert_eq!(grid.chunk_index(3, 5), Some(23));
        assert_eq!(grid.chunk_index(0, 6), None);
        assert_eq!(
            grid.chunk_coords(24),
            Err(WorldError::InvalidChunkIndex(24))
        );
    }

    #[test]
    fn interior_column_touches_only_its_chunk() {
        let grid = ChunkGrid::new(16, 16, 4).unwrap();
        assert_eq!(grid.chunks_touching_column(5, 6), vec![grid.chunk_index(1, 1).unwrap()]);
    }

    #[test]
    fn corner_column_touches_four_chunks() {
        let grid = ChunkGrid::new(16, 16, 4).unwrap();
        let mut touched = grid.chunks_touching_column(4, 4);
        touched.sort_unstable();
        let mut expected = vec![
            grid.chunk_index(1, 1).unwrap(),
            grid.chunk_index(0, 1).unwrap(),
            grid.chunk_index(1, 0).unwrap(),
            grid.chunk_index(0, 0).unwrap(),
        ];
        expected.sort_unstable();
        assert_eq!(touched, expected);
    }

    #[test]
    fn world_edge_column_skips_missing_neighbors() {
        let grid = ChunkGrid::new(16, 16, 4).unwrap();
        assert_eq!(grid.chunks_touching_column(0, 1), vec![0]);
    }

    #[test]
    fn modification_ids_are_shared_between_clones() {
        let ids = ChunkModificationIds::new(3);
        let reader = ids.clone();
        ids.bump(1);
        ids.bump(1);
        ids.bump(7);
        assert_eq!(reader.snapshot(), vec![0, 2, 0]);
        assert_eq!(reader.get(3), Err(WorldError::InvalidChunkIndex(3)));
    }
}

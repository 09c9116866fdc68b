//! Per-frame chunk culling from the combined camera matrix.
//!
//! Chunk corners, not chunk centers, are projected: a corner on screen means any
//! of the up to four chunks sharing it may have geometry on screen, so all of them
//! are marked. This keeps chunks whose corners all lie off screen but whose
//! neighbors' corners do from popping at the seams.

use bitvec::vec::BitVec;
use cgmath::{Matrix4, Vector4};
use log::trace;

use crate::engine_state::voxels::chunk::ChunkGrid;

/// Which chunks are worth considering this frame.
pub struct ChunkVisibilityIndex {
    grid: ChunkGrid,
    threshold: f32,
    reference_height: f32,
    visible: BitVec,
    visible_count: usize,
    last_eye_change_id: Option<u64>,
}

impl ChunkVisibilityIndex {
    /// Creates an index with nothing visible.
    ///
    /// # Arguments
    /// * `grid` - The chunk grid of the current world
    /// * `threshold` - Bound on clip-space x/y after the perspective divide
    /// * `reference_height` - World-space y at which corners are projected
    pub fn new(grid: ChunkGrid, threshold: f32, reference_height: f32) -> Self {
        Self {
            grid,
            threshold,
            reference_height,
            visible: BitVec::repeat(false, grid.chunk_count()),
            visible_count: 0,
            last_eye_change_id: None,
        }
    }

    /// Recomputes the visible set from scratch.
    ///
    /// # Returns
    /// The number of visible chunks
    pub fn update(&mut self, view_projection: &Matrix4<f32>) -> usize {
        self.visible.fill(false);
        let chunk_size = self.grid.chunk_size as f32;

        for j in 0..=self.grid.chunks_z {
            for i in 0..=self.grid.chunks_x {
                let corner = Vector4::new(i as f32 * chunk_size, self.reference_height, j as f32 * chunk_size, 1.0);
                if self.corner_on_screen(view_projection * corner) {
                    for (cx, cz) in [(i, j), (i - 1, j), (i, j - 1), (i - 1, j - 1)] {
                        if let Some(index) = self.grid.chunk_index(cx, cz) {
                            self.visible.set(index, true);
                        }
                    }
                }
            }
        }

        self.visible_count = self.visible.count_ones();
        trace!("{} of {} chunks visible", self.visible_count, self.visible.len());
        self.visible_count
    }

    /// Recomputes only when the camera moved since the last call.
    ///
    /// # Returns
    /// `Some(count)` after a recompute, `None` when the eye id was already seen
    pub fn update_if_changed(&mut self, eye_change_id: u64, view_projection: &Matrix4<f32>) -> Option<usize> {
        if self.last_eye_change_id == Some(eye_change_id) {
            return None;
        }
        self.last_eye_change_id = Some(eye_change_id);
        Some(self.update(view_projection))
    }

    /// Makes the next `update_if_changed` recompute, e.g. after the projection changed.
    pub fn invalidate(&mut self) {
        self.last_eye_change_id = None;
    }

    fn corner_on_screen(&self, clip: Vector4<f32>) -> bool {
        // Behind the camera the divide flips signs; such corners never count.
        if clip.w <= 0.0 {
            return false;
        }
        let x = clip.x / clip.w;
        let y = clip.y / clip.w;
        x.abs() <= self.threshold && y.abs() <= self.threshold
    }

    /// Visibility of a world-space point, by the chunk containing it.
    pub fn is_point_in_viewport(&self, x: f32, z: f32) -> bool {
        let chunk_size = self.grid.chunk_size as f32;
        let cx = (x / chunk_size).floor();
        let cz = (z / chunk_size).floor();
        if cx < 0.0 || cz < 0.0 {
            return false;
        }
        self.grid
            .chunk_index(cx as i32, cz as i32)
            .is_some_and(|index| self.visible[index])
    }

    pub fn is_chunk_visible(&self, chunk_index: usize) -> bool {
        self.visible.get(chunk_index).is_some_and(|bit| *bit)
    }

    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// Indices of the visible chunks, ascending.
    pub fn visible_chunks(&self) -> impl Iterator<Item = usize> + '_ {
        self.visible.iter_ones()
    }
}

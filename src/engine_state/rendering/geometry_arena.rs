//! CPU staging area for the side layers of every chunk.
//!
//! All chunks share one growable array of `SideQuad` records, mirrored into one
//! GPU buffer so a single multi-draw call can render them. Each chunk owns a
//! contiguous region. When a chunk's new geometry does not fit anywhere, the array
//! grows and the arena's generation advances: the GPU copy has to be reallocated
//! and rewritten, and every `ArenaHandle` taken before the growth must be
//! refreshed before its range is trusted again.

use log::debug;

use crate::{engine_state::rendering::meshing::SideQuad, error::BufferError};

/// A chunk's region in the arena, valid for one arena generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaHandle {
    pub chunk_index: usize,
    /// First record of the region
    pub offset: usize,
    /// Number of records
    pub len: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    offset: usize,
    len: usize,
}

/// Growable side-quad storage with first-fit region allocation.
pub struct GeometryArena {
    quads: Vec<SideQuad>,
    regions: Vec<Option<Region>>,
    /// Unused ranges, sorted by offset and never adjacent
    free: Vec<Region>,
    generation: u64,
}

impl GeometryArena {
    /// Creates an arena for `chunk_count` chunks with room for `initial_capacity` records.
    pub fn new(chunk_count: usize, initial_capacity: usize) -> Self {
        let free = if initial_capacity > 0 {
            vec![Region {
                offset: 0,
                len: initial_capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            quads: vec![SideQuad::default(); initial_capacity],
            regions: vec![None; chunk_count],
            free,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Capacity in records.
    pub fn capacity(&self) -> usize {
        self.quads.len()
    }

    /// Number of records currently owned by chunks.
    pub fn used(&self) -> usize {
        self.regions.iter().flatten().map(|region| region.len).sum()
    }

    /// The whole backing array, for full re-uploads after growth.
    pub fn as_slice(&self) -> &[SideQuad] {
        &self.quads
    }

    /// Replaces a chunk's geometry.
    ///
    /// The chunk's previous region is released first, so a rebuild that shrinks
    /// or keeps its size reuses the space. Growth advances the generation.
    ///
    /// # Returns
    /// The handle of the new region
    pub fn store(&mut self, chunk_index: usize, quads: &[SideQuad]) -> Result<ArenaHandle, BufferError> {
        if chunk_index >= self.regions.len() {
            return Err(BufferError::UnknownRegion { chunk_index });
        }
        self.release(chunk_index);

        let region = match self.allocate(quads.len()) {
            Some(region) => region,
            None => self.grow(quads.len()),
        };
        self.quads[region.offset..region.offset + region.len].copy_from_slice(quads);
        self.regions[chunk_index] = Some(region);

        Ok(ArenaHandle {
            chunk_index,
            offset: region.offset,
            len: region.len,
            generation: self.generation,
        })
    }

    /// Frees a chunk's region. Does nothing if the chunk has none.
    pub fn release(&mut self, chunk_index: usize) {
        if let Some(region) = self.regions.get_mut(chunk_index).and_then(Option::take) {
            self.free_region(region);
        }
    }

    /// The records behind a handle.
    ///
    /// # Errors
    /// `BufferError::StaleHandle` when the arena grew since the handle was issued.
    pub fn resolve(&self, handle: &ArenaHandle) -> Result<&[SideQuad], BufferError> {
        if handle.generation != self.generation {
            return Err(BufferError::StaleHandle {
                held: handle.generation,
                current: self.generation,
            });
        }
        let end = handle.offset + handle.len;
        self.quads.get(handle.offset..end).ok_or(BufferError::OutOfBounds {
            offset: handle.offset,
            end,
            len: self.quads.len(),
        })
    }

    /// Re-issues a handle for the chunk's current region.
    pub fn refresh(&self, handle: &ArenaHandle) -> Result<ArenaHandle, BufferError> {
        let region = self
            .regions
            .get(handle.chunk_index)
            .copied()
            .flatten()
            .ok_or(BufferError::UnknownRegion {
                chunk_index: handle.chunk_index,
            })?;
        Ok(ArenaHandle {
            chunk_index: handle.chunk_index,
            offset: region.offset,
            len: region.len,
            generation: self.generation,
        })
    }

    fn allocate(&mut self, len: usize) -> Option<Region> {
        if len == 0 {
            return Some(Region { offset: 0, len: 0 });
        }
        let slot = self.free.iter().position(|region| region.len >= len)?;
        let region = &mut self.free[slot];
        let allocated = Region {
            offset: region.offset,
            len,
        };
        region.offset += len;
        region.len -= len;
        if region.len == 0 {
            self.free.remove(slot);
        }
        Some(allocated)
    }

    fn grow(&mut self, len: usize) -> Region {
        let old_capacity = self.quads.len();
        let new_capacity = (old_capacity * 2).max(old_capacity + len);
        self.quads.resize(new_capacity, SideQuad::default());
        self.free_region(Region {
            offset: old_capacity,
            len: new_capacity - old_capacity,
        });
        self.generation += 1;
        debug!(
            "Geometry arena grew from {} to {} records (generation {})",
            old_capacity, new_capacity, self.generation
        );
        // The tail range is now large enough by construction.
        self.allocate(len).unwrap_or(Region {
            offset: old_capacity,
            len,
        })
    }

    fn free_region(&mut self, region: Region) {
        if region.len == 0 {
            return;
        }
        let at = self.free.partition_point(|free| free.offset < region.offset);
        self.free.insert(at, region);

        // Merge with the following range, then with the preceding one.
        if at + 1 < self.free.len() && self.free[at].offset + self.free[at].len == self.free[at + 1].offset {
            self.free[at].len += self.free[at + 1].len;
            self.free.remove(at + 1);
        }
        if at > 0 && self.free[at - 1].offset + self.free[at - 1].len == self.free[at].offset {
            self.free[at - 1].len += self.free[at].len;
            self.free.remove(at);
        }
    }
}

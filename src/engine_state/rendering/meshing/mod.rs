//! Mesh generation for chunk geometry.
//!
//! This module turns a chunk of the voxel store into the two compact layers the
//! terrain shader draws from. It never produces triangles itself: the shader
//! expands every record into a quad.
//!
//! # Architecture
//! - `snapshot`: copies the data one chunk depends on out of the locked world
//! - `top_layer`: one packed AO byte per column for the column's top face
//! - `side_layer`: one `SideQuad` per exposed unit-height vertical face
//! - `ambient_occlusion`: the corner occlusion rule both layers share
//!
//! # Threading
//! `mesh_chunk` holds the world read lock only while copying the snapshot. Both
//! layers are then built from the copy, so the simulation thread can write while
//! workers are busy meshing.

use log::trace;

use crate::{
    engine_state::voxels::world::{SharedWorld, VoxelWorld},
    error::WorldError,
};

pub mod ambient_occlusion;
pub mod side_layer;
pub mod snapshot;
pub mod top_layer;

pub use side_layer::{FaceAxis, SideQuad};
pub use snapshot::ChunkSnapshot;

/// The geometry of one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMesh {
    /// Packed top-face AO, `chunk_size²` bytes indexed by `top_layer::top_layer_index`
    pub top_ao: Vec<u8>,
    /// Vertical faces of the chunk, in column order
    pub side_quads: Vec<SideQuad>,
}

impl ChunkMesh {
    /// Number of vertices the shader expands the side layer into.
    pub fn side_vertex_count(&self) -> u32 {
        self.side_quads.len() as u32 * 6
    }
}

/// Builds both layers from a captured snapshot.
pub fn build_chunk_mesh(snapshot: &ChunkSnapshot) -> ChunkMesh {
    let start = web_time::Instant::now();
    let mesh = ChunkMesh {
        top_ao: top_layer::build_top_layer(snapshot),
        side_quads: side_layer::build_side_layer(snapshot),
    };
    trace!(
        "Meshed chunk {} ({} side quads) in {:?}",
        snapshot.chunk_index,
        mesh.side_quads.len(),
        start.elapsed()
    );
    mesh
}

/// Meshes a chunk of an unshared world. Returns the mesh together with the
/// modification id it reflects.
pub fn mesh_world_chunk(world: &VoxelWorld, chunk_index: usize) -> Result<(ChunkMesh, u32), WorldError> {
    let snapshot = ChunkSnapshot::capture(world, chunk_index)?;
    Ok((build_chunk_mesh(&snapshot), snapshot.modification_id))
}

/// Meshes a chunk of the shared world, holding the read lock only for the copy.
pub fn mesh_chunk(world: &SharedWorld, chunk_index: usize) -> Result<(ChunkMesh, u32), WorldError> {
    let snapshot = {
        let guard = world.read();
        ChunkSnapshot::capture(&guard, chunk_index)?
    };
    Ok((build_chunk_mesh(&snapshot), snapshot.modification_id))
}

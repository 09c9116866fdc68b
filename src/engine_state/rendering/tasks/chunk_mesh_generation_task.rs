//! Task for generating the mesh of one chunk on a worker thread.

use log::debug;

use crate::{
    engine_state::{
        rendering::meshing::{mesh_chunk, ChunkMesh},
        task_management::task::Task,
        voxels::world::SharedWorld,
    },
    error::MeshTaskError,
};

/// The geometry of a chunk together with the modification id it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeshResult {
    pub chunk_index: usize,
    pub mesh: ChunkMesh,
    /// Modification id of the chunk when its snapshot was taken. Comparing it with
    /// the current id tells whether the result is already out of date.
    pub modification_id: u32,
}

/// A task that builds the mesh of one chunk.
///
/// The task holds its own handle on the shared world and takes the read lock
/// only while copying the chunk's snapshot.
pub struct ChunkMeshGenerationTask {
    world: SharedWorld,
    chunk_index: usize,
}

impl ChunkMeshGenerationTask {
    /// Creates a new chunk mesh generation task.
    ///
    /// # Arguments
    /// * `world` - Handle on the shared world to snapshot
    /// * `chunk_index` - The chunk to mesh
    pub fn new(world: SharedWorld, chunk_index: usize) -> Self {
        Self { world, chunk_index }
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }
}

impl Task for ChunkMeshGenerationTask {
    type Output = ChunkMeshResult;

    fn process(self) -> Result<ChunkMeshResult, MeshTaskError> {
        let start = web_time::Instant::now();
        let (mesh, modification_id) = mesh_chunk(&self.world, self.chunk_index)?;
        debug!(
            "Chunk {} meshed at modification {} in {:?}",
            self.chunk_index,
            modification_id,
            start.elapsed()
        );
        Ok(ChunkMeshResult {
            chunk_index: self.chunk_index,
            mesh,
            modification_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkMeshGenerationTask;
    use crate::{
        config::GenerationMethod,
        engine_state::{task_management::task::Task, voxels::world::VoxelWorld},
        error::{MeshTaskError, WorldError},
    };

    #[test]
    fn result_records_the_snapshot_modification_id() {
        let mut world = VoxelWorld::new(8, 8, 8, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 2 }).unwrap();
        let world = world.share();
        world.set_block(1, 5, 1, 1).unwrap();

        let result = ChunkMeshGenerationTask::new(world.clone(), 0).process().unwrap();
        assert_eq!(result.chunk_index, 0);
        assert_eq!(result.modification_id, world.modification_id(0).unwrap());
        assert!(!result.mesh.side_quads.is_empty());
    }

    #[test]
    fn unknown_chunk_fails_the_task() {
        let world = VoxelWorld::new(4, 4, 4, 4).unwrap().share();
        assert_eq!(
            ChunkMeshGenerationTask::new(world, 1).process(),
            Err(MeshTaskError::World(WorldError::InvalidChunkIndex(1)))
        );
    }
}

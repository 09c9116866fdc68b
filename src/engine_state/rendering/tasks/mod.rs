//! Background tasks for the rendering system.
//!
//! # Available Tasks
//! - `ChunkMeshGenerationTask`: builds the mesh of one chunk off the render thread
//!
//! `ChunkMeshScheduler` ties the generic `WorkScheduler` to the shared world, so
//! the render side can ask for "a mesh of chunk X" and get a future back.

pub mod chunk_mesh_generation_task;

pub use chunk_mesh_generation_task::{ChunkMeshGenerationTask, ChunkMeshResult};

use crate::{
    engine_state::{
        task_management::{task::TaskFuture, WorkScheduler},
        voxels::world::SharedWorld,
    },
    error::{MeshTaskError, WorldError},
};

/// Future of a chunk mesh build.
pub type MeshFuture = TaskFuture<ChunkMeshResult>;

/// Schedules chunk mesh builds against one shared world.
pub struct ChunkMeshScheduler {
    world: SharedWorld,
    scheduler: WorkScheduler<ChunkMeshGenerationTask>,
}

impl ChunkMeshScheduler {
    pub fn new(world: SharedWorld, scheduler: WorkScheduler<ChunkMeshGenerationTask>) -> Self {
        Self { world, scheduler }
    }

    /// Schedules a mesh build for a chunk.
    ///
    /// # Errors
    /// `WorldError::InvalidChunkIndex` if the chunk does not exist; nothing is scheduled.
    pub fn schedule_task(&mut self, chunk_index: usize) -> Result<MeshFuture, WorldError> {
        if chunk_index >= self.world.grid().chunk_count() {
            return Err(WorldError::InvalidChunkIndex(chunk_index));
        }
        let task = ChunkMeshGenerationTask::new(self.world.clone(), chunk_index);
        Ok(self.scheduler.schedule_task(task))
    }

    /// Resolves the futures of finished builds. See `WorkScheduler::process_completed_tasks`.
    pub fn process_completed_tasks(&mut self) -> usize {
        self.scheduler.process_completed_tasks()
    }

    /// Blocks until a build finishes.
    pub fn wait(&mut self, future: MeshFuture) -> Result<ChunkMeshResult, MeshTaskError> {
        self.scheduler.wait(future)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn runner_name(&self) -> &'static str {
        self.scheduler.runner_name()
    }
}

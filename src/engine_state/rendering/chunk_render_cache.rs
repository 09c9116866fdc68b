//! Render-side bookkeeping of every chunk's mesh.
//!
//! Each frame the cache:
//! 1. accepts finished mesh builds and uploads their geometry
//! 2. schedules a rebuild for every visible chunk whose modification id moved
//!    since its last accepted mesh, unless one is already in flight
//! 3. collects the draw ranges of the visible chunks into a `DrawBatch`
//!
//! A result that is already out of date when it arrives is still uploaded, since
//! slightly old geometry looks better than none. Its chunk stays marked for
//! rebuild and is rescheduled on the next frame.
//!
//! The "one build in flight per chunk" guarantee lives here, in the
//! `rebuild_requested` flag; the scheduler itself has no notion of chunks.

use log::{debug, warn};

use crate::{
    engine_state::{
        buffer_state::{BufferSink, BufferWriteCommand, SIDE_QUAD_BUFFER_NAME},
        camera_state::visibility::ChunkVisibilityIndex,
        rendering::{
            geometry_arena::{ArenaHandle, GeometryArena},
            meshing::SideQuad,
            tasks::{ChunkMeshResult, ChunkMeshScheduler, MeshFuture},
        },
        voxels::chunk::{ChunkGrid, ChunkModificationIds},
    },
    error::BufferError,
};

/// Vertices the shader generates per side quad.
pub const VERTICES_PER_QUAD: u32 = 6;

/// Initial arena capacity, in side quads per chunk.
const INITIAL_QUADS_PER_CHUNK: usize = 64;

/// Bookkeeping of one chunk.
#[derive(Default)]
pub struct ChunkRenderEntry {
    /// Modification id of the last accepted mesh, `None` before the first one
    pub last_modification_id: Option<u32>,
    /// A build for this chunk is in flight
    pub rebuild_requested: bool,
    /// First vertex of the chunk's side geometry in the side-quad buffer
    pub gpu_offset: u32,
    /// Number of side vertices to draw
    pub vertex_count: u32,
    pending: Option<MeshFuture>,
    handle: Option<ArenaHandle>,
}

impl ChunkRenderEntry {
    /// Whether the chunk changed since its last accepted mesh.
    pub fn needs_rebuild(&self, current_modification_id: u32) -> bool {
        self.last_modification_id != Some(current_modification_id)
    }
}

/// Draw ranges of one frame, ready for a single multi-draw call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawBatch {
    /// Every visible chunk, drawn or not
    pub visible_chunks: Vec<usize>,
    /// First vertex of each draw
    pub firsts: Vec<u32>,
    /// Vertex count of each draw
    pub counts: Vec<u32>,
}

impl DrawBatch {
    pub fn draw_count(&self) -> usize {
        self.firsts.len()
    }
}

/// What the cache did during one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub scheduled: usize,
    pub accepted: usize,
    /// Accepted results that were already out of date on arrival
    pub accepted_stale: usize,
    pub failed: usize,
    pub in_flight: usize,
}

/// Per-chunk mesh state and the CPU copy of the uploaded geometry.
pub struct ChunkRenderCache {
    grid: ChunkGrid,
    entries: Vec<ChunkRenderEntry>,
    arena: GeometryArena,
    /// Arena generation currently mirrored in the side-quad buffer
    uploaded_generation: Option<u64>,
    /// Top-layer AO of every chunk, one `chunk_size²` slab per chunk index
    top_ao_map: Vec<u8>,
    top_ao_revision: u64,
}

impl ChunkRenderCache {
    pub fn new(grid: ChunkGrid) -> Self {
        let chunk_count = grid.chunk_count();
        Self {
            grid,
            entries: (0..chunk_count).map(|_| ChunkRenderEntry::default()).collect(),
            arena: GeometryArena::new(chunk_count, chunk_count * INITIAL_QUADS_PER_CHUNK),
            uploaded_generation: None,
            top_ao_map: vec![0; chunk_count * grid.columns_per_chunk()],
            top_ao_revision: 0,
        }
    }

    pub fn entry(&self, chunk_index: usize) -> Option<&ChunkRenderEntry> {
        self.entries.get(chunk_index)
    }

    /// Top-layer AO of the whole world, laid out by chunk index.
    pub fn top_ao_map(&self) -> &[u8] {
        &self.top_ao_map
    }

    /// Bumped whenever `top_ao_map` changes.
    pub fn top_ao_revision(&self) -> u64 {
        self.top_ao_revision
    }

    pub fn arena(&self) -> &GeometryArena {
        &self.arena
    }

    /// Runs one frame of bookkeeping.
    ///
    /// # Errors
    /// Only upload failures reported by the sink; scheduling and build failures are
    /// retried on later frames.
    pub fn update(
        &mut self,
        visibility: &ChunkVisibilityIndex,
        scheduler: &mut ChunkMeshScheduler,
        sink: &mut dyn BufferSink,
    ) -> Result<(DrawBatch, CacheStats), BufferError> {
        let mut stats = CacheStats::default();
        let modification_ids = scheduler.world().modification_ids().clone();

        scheduler.process_completed_tasks();
        self.collect_results(&modification_ids, sink, &mut stats)?;
        self.request_rebuilds(visibility.visible_chunks(), &modification_ids, scheduler, &mut stats);

        stats.in_flight = self.entries.iter().filter(|entry| entry.rebuild_requested).count();
        Ok((self.draw_batch(visibility), stats))
    }

    /// Schedules a build for every listed chunk that is out of date and has no
    /// build in flight.
    pub fn request_rebuilds(
        &mut self,
        chunks: impl Iterator<Item = usize>,
        modification_ids: &ChunkModificationIds,
        scheduler: &mut ChunkMeshScheduler,
        stats: &mut CacheStats,
    ) {
        for chunk_index in chunks {
            let Ok(current) = modification_ids.get(chunk_index) else {
                continue;
            };
            let Some(entry) = self.entries.get_mut(chunk_index) else {
                continue;
            };
            if entry.rebuild_requested || !entry.needs_rebuild(current) {
                continue;
            }
            match scheduler.schedule_task(chunk_index) {
                Ok(future) => {
                    entry.rebuild_requested = true;
                    entry.pending = Some(future);
                    stats.scheduled += 1;
                }
                Err(err) => warn!("Could not schedule mesh of chunk {}: {}", chunk_index, err),
            }
        }
    }

    /// Takes every resolved future and uploads the results.
    pub fn collect_results(
        &mut self,
        modification_ids: &ChunkModificationIds,
        sink: &mut dyn BufferSink,
        stats: &mut CacheStats,
    ) -> Result<(), BufferError> {
        for chunk_index in 0..self.entries.len() {
            let entry = &mut self.entries[chunk_index];
            let Some(result) = entry.pending.as_mut().and_then(MeshFuture::try_take) else {
                continue;
            };
            entry.pending = None;
            entry.rebuild_requested = false;

            match result {
                Ok(result) => {
                    let current = modification_ids.get(chunk_index).ok();
                    if current != Some(result.modification_id) {
                        stats.accepted_stale += 1;
                    }
                    self.accept(result, sink)?;
                    stats.accepted += 1;
                }
                Err(err) => {
                    debug!("Mesh of chunk {} failed, retrying later: {}", chunk_index, err);
                    stats.failed += 1;
                }
            }
        }
        Ok(())
    }

    fn accept(&mut self, result: ChunkMeshResult, sink: &mut dyn BufferSink) -> Result<(), BufferError> {
        let ChunkMeshResult {
            chunk_index,
            mesh,
            modification_id,
        } = result;

        let handle = self.arena.store(chunk_index, &mesh.side_quads)?;

        // The old region is freed. Until the upload lands the entry draws nothing
        // and counts as never built, so a failed upload is retried.
        let entry = &mut self.entries[chunk_index];
        entry.handle = Some(handle);
        entry.gpu_offset = handle.offset as u32 * VERTICES_PER_QUAD;
        entry.vertex_count = 0;
        entry.last_modification_id = None;

        if self.uploaded_generation == Some(self.arena.generation()) {
            self.upload_region(&handle, sink)?;
        } else {
            self.upload_whole_arena(sink)?;
        }

        let entry = &mut self.entries[chunk_index];
        entry.vertex_count = mesh.side_vertex_count();
        entry.last_modification_id = Some(modification_id);

        let slab = self.grid.columns_per_chunk();
        if mesh.top_ao.len() == slab {
            self.top_ao_map[chunk_index * slab..(chunk_index + 1) * slab].copy_from_slice(&mesh.top_ao);
            self.top_ao_revision += 1;
        }
        Ok(())
    }

    fn upload_region(&self, handle: &ArenaHandle, sink: &mut dyn BufferSink) -> Result<(), BufferError> {
        let quads = self.arena.resolve(handle)?;
        if quads.is_empty() {
            return Ok(());
        }
        sink.write(BufferWriteCommand::new(
            format!("side quads of chunk {}", handle.chunk_index),
            SIDE_QUAD_BUFFER_NAME,
            (handle.offset * std::mem::size_of::<SideQuad>()) as u64,
            quads.to_vec(),
        ))
    }

    /// Mirrors the whole arena after it grew, and moves every chunk's handle to
    /// the new generation.
    fn upload_whole_arena(&mut self, sink: &mut dyn BufferSink) -> Result<(), BufferError> {
        let bytes = std::mem::size_of_val(self.arena.as_slice()) as u64;
        sink.ensure_capacity(SIDE_QUAD_BUFFER_NAME, bytes);
        if bytes > 0 {
            sink.write(BufferWriteCommand::new(
                "side quad arena",
                SIDE_QUAD_BUFFER_NAME,
                0,
                self.arena.as_slice().to_vec(),
            ))?;
        }

        for entry in &mut self.entries {
            if let Some(handle) = entry.handle {
                let refreshed = self.arena.refresh(&handle)?;
                entry.gpu_offset = refreshed.offset as u32 * VERTICES_PER_QUAD;
                entry.handle = Some(refreshed);
            }
        }
        self.uploaded_generation = Some(self.arena.generation());
        debug!("Uploaded side quad arena at generation {}", self.arena.generation());
        Ok(())
    }

    /// Draw ranges of the visible chunks that have side geometry.
    pub fn draw_batch(&self, visibility: &ChunkVisibilityIndex) -> DrawBatch {
        let mut batch = DrawBatch::default();
        for chunk_index in visibility.visible_chunks() {
            batch.visible_chunks.push(chunk_index);
            if let Some(entry) = self.entries.get(chunk_index) {
                if entry.vertex_count > 0 {
                    batch.firsts.push(entry.gpu_offset);
                    batch.counts.push(entry.vertex_count);
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Matrix4;

    use super::{CacheStats, ChunkRenderCache, VERTICES_PER_QUAD};
    use crate::{
        config::GenerationMethod,
        engine_state::{
            buffer_state::{BufferSink, BufferWriteCommand, RecordingBufferSink, SIDE_QUAD_BUFFER_NAME},
            camera_state::visibility::ChunkVisibilityIndex,
            rendering::{
                meshing::{mesh_world_chunk, SideQuad},
                tasks::{ChunkMeshGenerationTask, ChunkMeshResult, ChunkMeshScheduler},
            },
            task_management::{
                task::{TaskRequest, TaskResponse},
                InlineRunner, TaskRunner, WorkScheduler,
            },
            voxels::world::{SharedWorld, VoxelWorld},
        },
        error::{BufferError, MeshTaskError},
    };

    /// Turns down every build it is given.
    #[derive(Default)]
    struct RejectingRunner {
        answers: Vec<TaskResponse<ChunkMeshResult>>,
    }

    impl TaskRunner<ChunkMeshGenerationTask> for RejectingRunner {
        fn submit(&mut self, request: TaskRequest<ChunkMeshGenerationTask>) {
            self.answers.push(TaskResponse {
                task_id: request.task_id,
                result: Err(MeshTaskError::Rejected {
                    task_id: request.task_id,
                    reason: "out of memory".to_string(),
                }),
            });
        }

        fn poll_responses(&mut self) -> Vec<TaskResponse<ChunkMeshResult>> {
            std::mem::take(&mut self.answers)
        }

        fn outstanding(&self) -> usize {
            self.answers.len()
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    /// A recording sink whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakySink {
        inner: RecordingBufferSink,
        failing: bool,
    }

    impl BufferSink for FlakySink {
        fn ensure_capacity(&mut self, buffer_name: &'static str, size: u64) {
            self.inner.ensure_capacity(buffer_name, size);
        }

        fn write(&mut self, command: BufferWriteCommand) -> Result<(), BufferError> {
            if self.failing {
                return Err(BufferError::UnknownBuffer(command.buffer_name));
            }
            self.inner.write(command)
        }
    }

    /// Sees the whole 8x8 world: x and z in 0..=8 map into clip [-1, 1].
    fn overview() -> Matrix4<f32> {
        #[rustfmt::skip]
        let matrix = Matrix4::new(
            0.25, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.25, 0.0, 0.0,
            -1.0, -1.0, 0.0, 1.0,
        );
        matrix
    }

    fn setup() -> (SharedWorld, ChunkMeshScheduler, ChunkVisibilityIndex) {
        let mut world = VoxelWorld::new(8, 8, 8, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 1 }).unwrap();
        let world = world.share();
        let scheduler = ChunkMeshScheduler::new(
            world.clone(),
            WorkScheduler::with_runner(Box::new(InlineRunner::new())),
        );
        let mut visibility = ChunkVisibilityIndex::new(world.grid(), 1.0, 0.0);
        visibility.update(&overview());
        (world, scheduler, visibility)
    }

    #[test]
    fn second_request_waits_for_the_first() {
        let (world, mut scheduler, _) = setup();
        let mut cache = ChunkRenderCache::new(world.grid());
        let ids = world.modification_ids().clone();
        let mut stats = CacheStats::default();

        cache.request_rebuilds([0].into_iter(), &ids, &mut scheduler, &mut stats);
        world.set_block(1, 4, 1, 1).unwrap();
        cache.request_rebuilds([0].into_iter(), &ids, &mut scheduler, &mut stats);

        assert_eq!(stats.scheduled, 1);
        assert_eq!(scheduler.pending_count(), 1);
        assert!(cache.entry(0).unwrap().rebuild_requested);
    }

    #[test]
    fn stale_result_is_uploaded_and_rebuilt_again() {
        let (world, mut scheduler, visibility) = setup();
        let mut cache = ChunkRenderCache::new(world.grid());
        let mut sink = RecordingBufferSink::new();

        let (_, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.scheduled, 4);

        // The builds already ran inline; the world changes before they are collected.
        world.set_block(1, 3, 1, 1).unwrap();
        let (_, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.accepted, 4);
        assert_eq!(stats.accepted_stale, 1);
        assert_eq!(stats.scheduled, 1);
        assert!(cache.entry(0).unwrap().last_modification_id.is_some());

        let (batch, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.accepted_stale, 0);
        assert_eq!(stats.scheduled, 0);
        assert_eq!(stats.in_flight, 0);

        let (expected, _) = mesh_world_chunk(&world.read(), 0).unwrap();
        let entry = cache.entry(0).unwrap();
        assert_eq!(entry.vertex_count, expected.side_quads.len() as u32 * VERTICES_PER_QUAD);
        assert!(batch.firsts.contains(&entry.gpu_offset));
        assert_eq!(batch.visible_chunks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn uploaded_bytes_match_the_arena() {
        let (world, mut scheduler, visibility) = setup();
        for x in 0..8 {
            for y in 2..6 {
                world.set_block(x, y, (x * 3) % 8, 1).unwrap();
            }
        }
        let mut cache = ChunkRenderCache::new(world.grid());
        let mut sink = RecordingBufferSink::new();

        cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        let (batch, _) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();

        let uploaded = sink.bytes(SIDE_QUAD_BUFFER_NAME).unwrap();
        assert_eq!(uploaded, bytemuck::cast_slice::<_, u8>(cache.arena().as_slice()));
        assert_eq!(batch.draw_count(), 4);
        let total: u32 = batch.counts.iter().sum();
        assert_eq!(total as usize, cache.arena().used() * VERTICES_PER_QUAD as usize);
    }

    #[test]
    fn invisible_chunks_are_not_scheduled() {
        let (world, mut scheduler, _) = setup();
        let mut visibility = ChunkVisibilityIndex::new(world.grid(), 1.0, 0.0);
        let mut far_away = overview();
        far_away.w.x = 100.0;
        assert_eq!(visibility.update(&far_away), 0);

        let mut cache = ChunkRenderCache::new(world.grid());
        let mut sink = RecordingBufferSink::new();
        let (batch, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.scheduled, 0);
        assert!(batch.visible_chunks.is_empty());
    }

    #[test]
    fn rejected_build_is_counted_and_retried() {
        let (world, _, visibility) = setup();
        let mut scheduler = ChunkMeshScheduler::new(
            world.clone(),
            WorkScheduler::with_runner(Box::new(RejectingRunner::default())),
        );
        let mut cache = ChunkRenderCache::new(world.grid());
        let mut sink = RecordingBufferSink::new();

        let (_, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.scheduled, 4);

        let ids = world.modification_ids().clone();
        let mut stats = CacheStats::default();
        scheduler.process_completed_tasks();
        cache.collect_results(&ids, &mut sink, &mut stats).unwrap();
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.accepted, 0);
        for chunk_index in 0..4 {
            let entry = cache.entry(chunk_index).unwrap();
            assert!(!entry.rebuild_requested);
            assert_eq!(entry.last_modification_id, None);
        }

        let (batch, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.scheduled, 4);
        assert_eq!(batch.draw_count(), 0);
        assert!(sink.bytes(SIDE_QUAD_BUFFER_NAME).is_none());
    }

    #[test]
    fn failed_upload_leaves_the_chunk_undrawn_and_out_of_date() {
        let (world, mut scheduler, visibility) = setup();
        for y in 2..6 {
            world.set_block(2, y, 2, 1).unwrap();
        }
        let mut cache = ChunkRenderCache::new(world.grid());
        let mut sink = FlakySink::default();

        cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert!(cache.entry(0).unwrap().vertex_count > 0);

        // Taller pillar: the rebuild stores a new region and frees the old one.
        world.set_block(2, 6, 2, 1).unwrap();
        cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        sink.failing = true;
        assert!(cache.update(&visibility, &mut scheduler, &mut sink).is_err());

        let entry = cache.entry(0).unwrap();
        let handle = entry.handle.unwrap();
        assert!(cache.arena().resolve(&handle).is_ok());
        assert_eq!(entry.gpu_offset, handle.offset as u32 * VERTICES_PER_QUAD);
        assert_eq!(entry.vertex_count, 0);
        assert_eq!(entry.last_modification_id, None);
        assert!(!entry.rebuild_requested);

        sink.failing = false;
        let (_, stats) = cache.update(&visibility, &mut scheduler, &mut sink).unwrap();
        assert_eq!(stats.scheduled, 1);
        cache.update(&visibility, &mut scheduler, &mut sink).unwrap();

        let (expected, modification_id) = mesh_world_chunk(&world.read(), 0).unwrap();
        let entry = cache.entry(0).unwrap();
        assert_eq!(entry.last_modification_id, Some(modification_id));
        assert_eq!(entry.vertex_count, expected.side_vertex_count());
        let quad_size = std::mem::size_of::<SideQuad>();
        let start = (entry.gpu_offset / VERTICES_PER_QUAD) as usize * quad_size;
        let end = start + expected.side_quads.len() * quad_size;
        assert_eq!(
            &sink.inner.bytes(SIDE_QUAD_BUFFER_NAME).unwrap()[start..end],
            bytemuck::cast_slice::<_, u8>(&expected.side_quads)
        );
    }
}

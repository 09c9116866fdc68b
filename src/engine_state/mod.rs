//! # Engine State Module
//!
//! The render-thread coordinator of the engine.
//!
//! ## Key Components
//!
//! * `EngineState` - owns the render side and runs one frame at a time
//! * `buffer_state` - the upload contract towards the GPU layer
//! * `camera_state` - camera, projection and chunk visibility
//! * `rendering` - mesh building, the render cache and world texture uploads
//! * `task_management` - the worker pool behind mesh builds
//! * `voxels` - the voxel store shared with the simulation thread
//!
//! ## Threads
//!
//! The simulation thread holds a clone of the `SharedWorld` from `EngineState::world`
//! and is the only writer. The render thread calls `EngineState::frame` and never
//! writes to the world; mesh workers only read it.

use cgmath::Deg;
use log::{debug, info};
use web_time::{Duration, Instant};

use crate::{
    config::EngineConfig,
    engine_state::{
        buffer_state::{BufferSink, BufferWriteCommand, CAMERA_BUFFER_NAME},
        camera_state::{
            camera::{view_projection, Camera, CameraUniform, Projection},
            visibility::ChunkVisibilityIndex,
        },
        rendering::{
            chunk_render_cache::{CacheStats, ChunkRenderCache, DrawBatch},
            tasks::ChunkMeshScheduler,
            world_textures::{WorldLayer, WorldTextureUploader},
        },
        task_management::WorkScheduler,
        voxels::world::{SharedWorld, VoxelWorld},
    },
    error::{BufferError, WorldError},
};

pub mod buffer_state;
pub mod camera_state;
pub mod rendering;
pub mod task_management;
pub mod voxels;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);
const DEFAULT_FOVY_DEGREES: f32 = 70.0;
const ZNEAR: f32 = 0.1;
const ZFAR: f32 = 2000.0;

/// What happened during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frames run so far, this one included
    pub frame: u64,
    /// Whether the visible set was recomputed this frame
    pub visibility_recomputed: bool,
    pub visible_chunks: usize,
    pub draw_batch: DrawBatch,
    pub cache_stats: CacheStats,
    /// World-sized layers that were re-sent this frame
    pub uploaded_layers: Vec<WorldLayer>,
    pub frame_time: Duration,
}

/// The render-side state of the engine.
///
/// # Examples
///
/// ```
/// use cgmath::{Deg, Point3};
/// use chunk_mesh_engine::{
///     config::EngineConfig,
///     engine_state::{buffer_state::RecordingBufferSink, camera_state::camera::Camera, EngineState},
/// };
///
/// let mut config = EngineConfig::default();
/// config.force_inline_scheduler = true;
/// let mut engine = EngineState::new(config).unwrap();
/// let mut sink = RecordingBufferSink::new();
/// let camera = Camera::new(Point3::new(64.0, 120.0, -40.0), Deg(90.0), Deg(-50.0));
///
/// let report = engine.frame(&camera, &mut sink).unwrap();
/// assert_eq!(report.frame, 1);
/// ```
pub struct EngineState {
    config: EngineConfig,
    world: SharedWorld,
    projection: Projection,
    visibility: ChunkVisibilityIndex,
    mesh_scheduler: ChunkMeshScheduler,
    render_cache: ChunkRenderCache,
    texture_uploader: WorldTextureUploader,
    /// Eye id of the camera uniform last written, `None` forces a write
    uploaded_camera_eye: Option<u64>,
    projection_changed: bool,
    frame_count: u64,
}

impl EngineState {
    /// Creates the world from the config, generates its contents and starts the
    /// mesh workers.
    ///
    /// # Errors
    /// `WorldError::InvalidDimensions` if the configured world cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self, WorldError> {
        let world_config = &config.world;
        let mut world = VoxelWorld::new(
            world_config.size_x,
            world_config.size_y,
            world_config.size_z,
            world_config.chunk_size,
        )?;

        world.generate(&world_config.generation)?;

        let world = world.share();
        Ok(Self::with_world(config, world))
    }

    /// Builds the render side around an existing world.
    ///
    /// The world's own dimensions win over the ones in `config.world`.
    pub fn with_world(config: EngineConfig, world: SharedWorld) -> Self {
        let grid = world.grid();
        let scheduler = WorkScheduler::new(config.resolved_worker_count(), config.force_inline_scheduler);
        info!("Meshing with the {} runner", scheduler.runner_name());

        Self {
            projection: Projection::new(
                DEFAULT_VIEWPORT.0,
                DEFAULT_VIEWPORT.1,
                Deg(DEFAULT_FOVY_DEGREES),
                ZNEAR,
                ZFAR,
            ),
            visibility: ChunkVisibilityIndex::new(
                grid,
                config.visibility.threshold,
                config.visibility.reference_height,
            ),
            mesh_scheduler: ChunkMeshScheduler::new(world.clone(), scheduler),
            render_cache: ChunkRenderCache::new(grid),
            texture_uploader: WorldTextureUploader::new(),
            uploaded_camera_eye: None,
            projection_changed: true,
            frame_count: 0,
            config,
            world,
        }
    }

    /// Runs one frame of the render side.
    ///
    /// 1. recomputes visibility if the camera moved or the viewport changed
    /// 2. writes the camera uniform if it changed
    /// 3. accepts finished meshes and schedules rebuilds of stale visible chunks
    /// 4. re-sends the world layers that changed
    ///
    /// # Errors
    /// Upload failures reported by the sink.
    pub fn frame(&mut self, camera: &Camera, sink: &mut dyn BufferSink) -> Result<FrameReport, BufferError> {
        let start_time = Instant::now();
        self.frame_count += 1;

        let view_proj = view_projection(camera, &self.projection);
        let visibility_recomputed = self
            .visibility
            .update_if_changed(camera.eye_change_id(), &view_proj)
            .is_some();

        if self.projection_changed || self.uploaded_camera_eye != Some(camera.eye_change_id()) {
            self.write_camera_uniform(camera, sink)?;
        }
        self.projection_changed = false;

        let (draw_batch, cache_stats) = self
            .render_cache
            .update(&self.visibility, &mut self.mesh_scheduler, sink)?;

        let uploaded_layers = self.texture_uploader.upload_if_changed(
            &self.world,
            self.render_cache.top_ao_map(),
            self.render_cache.top_ao_revision(),
            sink,
        )?;

        let report = FrameReport {
            frame: self.frame_count,
            visibility_recomputed,
            visible_chunks: self.visibility.visible_count(),
            draw_batch,
            cache_stats,
            uploaded_layers,
            frame_time: start_time.elapsed(),
        };
        debug!(
            "Frame {}: {} visible, {} draws, {} scheduled, {} accepted ({} stale), {} in flight, {:?}",
            report.frame,
            report.visible_chunks,
            report.draw_batch.draw_count(),
            report.cache_stats.scheduled,
            report.cache_stats.accepted,
            report.cache_stats.accepted_stale,
            report.cache_stats.in_flight,
            report.frame_time
        );
        Ok(report)
    }

    fn write_camera_uniform(&mut self, camera: &Camera, sink: &mut dyn BufferSink) -> Result<(), BufferError> {
        let uniform = CameraUniform::new(camera, &self.projection);
        sink.ensure_capacity(CAMERA_BUFFER_NAME, std::mem::size_of::<CameraUniform>() as u64);
        sink.write(BufferWriteCommand::new("camera uniform", CAMERA_BUFFER_NAME, 0, [uniform]))?;
        self.uploaded_camera_eye = Some(camera.eye_change_id());
        Ok(())
    }

    /// Adapts the projection to a new viewport size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.projection.resize(width, height);
            self.visibility.invalidate();
            self.projection_changed = true;
        }
    }

    /// Handle to the world, for the simulation thread.
    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn visibility(&self) -> &ChunkVisibilityIndex {
        &self.visibility
    }

    pub fn render_cache(&self) -> &ChunkRenderCache {
        &self.render_cache
    }

    /// Mesh builds scheduled but not yet resolved.
    pub fn pending_tasks(&self) -> usize {
        self.mesh_scheduler.pending_count()
    }
}

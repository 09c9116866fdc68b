#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Chunk Mesh Engine
//!
//! A chunked voxel world with incremental, visibility-gated chunk meshing.
//!
//! The world is a dense block array split into square column chunks. A simulation
//! thread edits it; every edit bumps the modification counters of the chunks it
//! touches. Each frame the render side works out which chunks are on screen,
//! rebuilds the meshes of visible chunks whose counters moved on a worker pool, and
//! hands the results to a GPU layer as buffer writes plus a multi-draw batch.
//!
//! ## Key Modules
//!
//! * `config` - serializable engine configuration
//! * `core` - shared-resource primitives
//! * `engine_state` - the world, meshing, visibility, task scheduling and the frame loop
//! * `error` - the engine's error enums
//! * `simulation` - a random block editor standing in for a game simulation
//!
//! ## Usage
//!
//! ```no_run
//! // Native headless demo
//! fn main() {
//!     chunk_mesh_engine::run();
//! }
//! ```
//!
//! For web applications:
//!
//! ```ignore
//! // Called from JavaScript
//! #[wasm_bindgen]
//! pub fn start() {
//!     chunk_mesh_engine::run_web();
//! }
//! ```

use cgmath::Point3;
use log::{error, info};
#[cfg(target_family = "wasm")]
use wasm_bindgen::prelude::wasm_bindgen;

use crate::{
    config::EngineConfig,
    engine_state::{
        buffer_state::RecordingBufferSink, camera_state::camera::Camera, EngineState, FrameReport,
    },
    simulation::BlockEditor,
};

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;
pub mod simulation;

/// Frames rendered by the demo before it exits.
pub const DEMO_FRAMES: u64 = 600;
/// Frames between two statistics lines of the demo.
const STATS_INTERVAL: u64 = 60;
const EDITS_PER_STEP: usize = 8;
const ORBIT_SPEED: f32 = 0.01;

/// Orbits a camera around the middle of the world, looking at its center.
struct Orbit {
    center: Point3<f32>,
    radius: f32,
    height: f32,
    angle: f32,
}

impl Orbit {
    fn around(config: &EngineConfig) -> Self {
        let world = &config.world;
        Self {
            center: Point3::new(world.size_x as f32 / 2.0, 0.0, world.size_z as f32 / 2.0),
            radius: world.size_x.max(world.size_z) as f32 * 0.75,
            height: world.size_y as f32 * 1.5,
            angle: 0.0,
        }
    }

    fn advance(&mut self, camera: &mut Camera) {
        self.angle += ORBIT_SPEED;
        camera.set_position(Point3::new(
            self.center.x + self.radius * self.angle.cos(),
            self.height,
            self.center.z + self.radius * self.angle.sin(),
        ));
        camera.look_at(self.center);
    }
}

fn log_frame(report: &FrameReport, engine: &EngineState) {
    if report.frame % STATS_INTERVAL == 0 {
        info!(
            "Frame {}: {} visible chunks, {} draws, {} tasks pending, {} quads in the arena",
            report.frame,
            report.visible_chunks,
            report.draw_batch.draw_count(),
            engine.pending_tasks(),
            engine.render_cache().arena().used()
        );
    }
}

/// Runs the headless demo: a simulation thread edits the world while the render
/// side orbits it for `DEMO_FRAMES` frames.
#[cfg(not(target_family = "wasm"))]
pub fn run() {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Could not load the engine config: {}", err);
            return;
        }
    };
    let mut engine = match EngineState::new(config.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            error!("Could not create the world: {}", err);
            return;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let simulation = {
        let world = engine.world().clone();
        let running = running.clone();
        thread::Builder::new()
            .name("simulation".to_string())
            .spawn(move || {
                let mut editor = BlockEditor::new(0x5eed, EDITS_PER_STEP);
                while running.load(Ordering::Acquire) {
                    if let Err(err) = editor.step(&world) {
                        error!("Simulation step failed: {}", err);
                        break;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            })
    };
    let simulation = match simulation {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!("Could not start the simulation thread: {}", err);
            None
        }
    };

    let mut sink = RecordingBufferSink::new();
    let mut camera = Camera::new(Point3::new(0.0, 0.0, 0.0), cgmath::Deg(0.0), cgmath::Deg(0.0));
    let mut orbit = Orbit::around(&config);

    for _ in 0..DEMO_FRAMES {
        orbit.advance(&mut camera);
        match engine.frame(&camera, &mut sink) {
            Ok(report) => log_frame(&report, &engine),
            Err(err) => {
                error!("Frame failed: {}", err);
                break;
            }
        }
        thread::sleep(Duration::from_millis(16));
    }

    running.store(false, Ordering::Release);
    if let Some(handle) = simulation {
        if handle.join().is_err() {
            error!("Simulation thread panicked");
        }
    }
    info!(
        "Demo finished: {} bytes allocated in GPU buffers, {} bytes written",
        sink.get_total_allocated_memory(),
        sink.get_total_used_memory()
    );
}

/// Runs the demo in the browser. Without shared-memory threads the simulation
/// steps between frames instead of on its own thread.
#[cfg(target_family = "wasm")]
#[wasm_bindgen]
pub fn run_web() {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    // Fails only if a logger is already installed, which is fine to keep.
    let _ = console_log::init_with_level(log::Level::Info);

    let mut config = EngineConfig::default();
    config.force_inline_scheduler = !engine_state::task_management::THREADS_AVAILABLE;
    let mut engine = match EngineState::new(config.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            error!("Could not create the world: {}", err);
            return;
        }
    };

    let mut editor = BlockEditor::new(0x5eed, EDITS_PER_STEP);
    let mut sink = RecordingBufferSink::new();
    let mut camera = Camera::new(Point3::new(0.0, 0.0, 0.0), cgmath::Deg(0.0), cgmath::Deg(0.0));
    let mut orbit = Orbit::around(&config);

    for _ in 0..DEMO_FRAMES {
        if let Err(err) = editor.step(engine.world()) {
            error!("Simulation step failed: {}", err);
            return;
        }
        orbit.advance(&mut camera);
        match engine.frame(&camera, &mut sink) {
            Ok(report) => log_frame(&report, &engine),
            Err(err) => {
                error!("Frame failed: {}", err);
                return;
            }
        }
    }
}

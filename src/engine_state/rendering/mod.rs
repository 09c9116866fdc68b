//! Render-side half of the engine.
//!
//! This module turns world changes into uploads for the external GPU layer. It
//! never draws anything itself; its outputs are `BufferWriteCommand`s and a
//! per-frame `DrawBatch`.
//!
//! - `meshing`: the chunk mesh builder (top-layer AO and side-layer quads)
//! - `tasks`: the mesh build task and its scheduler front end
//! - `chunk_render_cache`: per-chunk rebuild decisions and draw ranges
//! - `geometry_arena`: the growable side-quad store mirrored to the GPU
//! - `world_textures`: whole-world block, height and AO uploads

pub mod chunk_render_cache;
pub mod geometry_arena;
pub mod meshing;
pub mod tasks;
pub mod world_textures;

pub use chunk_render_cache::{CacheStats, ChunkRenderCache, DrawBatch};
pub use world_textures::{WorldLayer, WorldTextureUploader};

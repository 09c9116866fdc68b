//! # Chunk Mesh Engine Demo
//!
//! Native entry point of the headless demo. It calls into the library's `run()`,
//! which builds the world from the config named by `VOXEL_ENGINE_CONFIG` (or the
//! defaults), edits it on a simulation thread and orbits a camera over it.
//!
//! For web applications, see the `run_web()` function in the library.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    #[cfg(not(target_family = "wasm"))]
    chunk_mesh_engine::run();
}

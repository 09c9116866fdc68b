//! # Core Module
//!
//! Concurrency primitives shared by the rest of the engine.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking.
//!   The voxel world is shared between the simulation thread and the mesh workers
//!   through one of these.

pub mod mt_resource;

pub use mt_resource::MtResource;

//! # Camera State Management
//!
//! This module handles all camera-related functionality including:
//! - Camera position and orientation tracking
//! - View and projection matrix calculations
//! - Chunk visibility determination from the combined matrix
//!
//! ## Core Components
//! - `Camera`: position and orientation, with a change counter
//! - `Projection`: the perspective projection
//! - `CameraUniform`: GPU representation of camera data for shaders
//! - `ChunkVisibilityIndex`: which chunks are on screen this frame

pub mod camera;
pub mod visibility;

pub use camera::{view_projection, Camera, CameraUniform, Projection};
pub use visibility::ChunkVisibilityIndex;

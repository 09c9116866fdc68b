//! # Error Types
//!
//! Every fallible operation in the engine reports one of the enums below.
//!
//! * `WorldError` - programmer errors against the voxel store (bad coordinates,
//!   bad chunk indices, impossible world dimensions). These are never clamped.
//! * `MeshTaskError` - a scheduled mesh build that could not deliver a result.
//!   The render cache treats it as "try again next frame".
//! * `BufferError` - stale or out-of-bounds handles into the geometry arena.
//! * `ConfigError` - loading an `EngineConfig` from disk or JSON failed.

use thiserror::Error;

use crate::engine_state::task_management::task::TaskId;

/// Errors raised by the voxel world.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("voxel coordinate ({x}, {y}, {z}) is outside the world")]
    OutOfRange { x: i32, y: i32, z: i32 },

    #[error("column ({x}, {z}) is outside the world")]
    ColumnOutOfRange { x: i32, z: i32 },

    #[error("chunk index {0} does not exist")]
    InvalidChunkIndex(usize),

    #[error("invalid world dimensions: {0}")]
    InvalidDimensions(String),
}

/// Errors delivered through a mesh future instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshTaskError {
    #[error("mesh task {task_id} was rejected: {reason}")]
    Rejected { task_id: TaskId, reason: String },

    #[error("no worker is left to run mesh tasks")]
    WorkerDisconnected,

    #[error("mesh task could not read the world: {0}")]
    World(#[from] WorldError),
}

/// Errors raised by the geometry arena and buffer sinks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("handle generation {held} does not match arena generation {current}")]
    StaleHandle { held: u64, current: u64 },

    #[error("range {offset}..{end} is outside the buffer (len {len})")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    #[error("chunk {chunk_index} has no geometry in the arena")]
    UnknownRegion { chunk_index: usize },

    #[error("buffer '{0}' does not exist")]
    UnknownBuffer(&'static str),
}

/// Errors raised while loading the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

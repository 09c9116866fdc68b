//! # Buffer State Module
//!
//! The engine never talks to a GPU API directly. Everything it wants uploaded is
//! expressed as a `BufferWriteCommand` and handed to a `BufferSink`, which the
//! embedding GPU layer implements.
//!
//! ## Key Components
//!
//! * `BufferWriteCommand` - a named buffer, a byte offset and the bytes to put there
//! * `AsBytes` - anything that can be viewed as plain bytes (`bytemuck` casts)
//! * `BufferSink` - the upload contract
//! * `RecordingBufferSink` - a CPU-side sink that keeps the bytes and usage
//!   analytics, used headless and in tests

use std::{collections::HashMap, fmt::Debug};

use bytemuck::NoUninit;
use log::trace;

use crate::error::BufferError;

/// Side-layer records of every chunk, laid out by the geometry arena
pub const SIDE_QUAD_BUFFER_NAME: &str = "side_quad_buffer";
/// Packed camera uniform
pub const CAMERA_BUFFER_NAME: &str = "camera_buffer";
/// Raw block ids of the whole world
pub const BLOCK_TEXTURE_NAME: &str = "world_block_texture";
/// Height index of the whole world
pub const HEIGHT_TEXTURE_NAME: &str = "world_height_texture";
/// Top-layer AO of the whole world, one `chunk_size²` slab per chunk
pub const TOP_AO_TEXTURE_NAME: &str = "world_top_ao_texture";

/// One upload: bytes destined for a byte offset of a named buffer.
pub struct BufferWriteCommand {
    /// Label for logs
    pub name: String,
    pub buffer_name: &'static str,
    /// Byte offset of the first written byte
    pub offset: u64,
    pub data: Box<dyn AsBytes + Send + Sync>,
}

impl BufferWriteCommand {
    pub fn new(
        name: impl Into<String>,
        buffer_name: &'static str,
        offset: u64,
        data: impl AsBytes + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            buffer_name,
            offset,
            data: Box::new(data),
        }
    }

    /// Byte offset one past the last written byte.
    pub fn end(&self) -> u64 {
        self.offset + self.data.as_bytes().len() as u64
    }
}

impl Debug for BufferWriteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferWriteCommand")
            .field("name", &self.name)
            .field("buffer_name", &self.buffer_name)
            .field("offset", &self.offset)
            .field("len", &self.data.as_bytes().len())
            .finish()
    }
}

/// Plain data that can be uploaded as-is.
pub trait AsBytes {
    fn as_bytes(&self) -> &[u8];
}

impl<T> AsBytes for Vec<T>
where
    T: NoUninit + Send + Sync,
{
    fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self)
    }
}

impl<T, const N: usize> AsBytes for [T; N]
where
    T: NoUninit + Send + Sync,
{
    fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self)
    }
}

/// The upload contract implemented by the GPU layer.
pub trait BufferSink {
    /// Makes sure the named buffer holds at least `size` bytes, reallocating it if
    /// needed. Existing contents may be lost on reallocation; the engine rewrites
    /// everything it cares about afterwards.
    fn ensure_capacity(&mut self, buffer_name: &'static str, size: u64);

    /// Applies a write.
    ///
    /// # Errors
    /// `BufferError::UnknownBuffer` for a buffer that was never sized, and
    /// `BufferError::OutOfBounds` for a write past its end.
    fn write(&mut self, command: BufferWriteCommand) -> Result<(), BufferError>;
}

/// Usage counters of one recorded buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Current size in bytes
    pub allocated_memory: u64,
    /// Highest byte offset ever written
    pub used_memory: u64,
    pub times_written: u64,
    /// Reallocations after the first sizing
    pub times_grown: u64,
}

#[derive(Debug, Default)]
struct RecordedBuffer {
    bytes: Vec<u8>,
    analytics: BufferAnalytics,
}

/// A `BufferSink` that keeps every buffer in memory.
#[derive(Debug, Default)]
pub struct RecordingBufferSink {
    buffers: HashMap<&'static str, RecordedBuffer>,
}

impl RecordingBufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a buffer.
    pub fn bytes(&self, buffer_name: &'static str) -> Option<&[u8]> {
        self.buffers.get(buffer_name).map(|buffer| buffer.bytes.as_slice())
    }

    pub fn analytics(&self, buffer_name: &'static str) -> Option<&BufferAnalytics> {
        self.buffers.get(buffer_name).map(|buffer| &buffer.analytics)
    }

    /// Sum of all buffer sizes.
    pub fn get_total_allocated_memory(&self) -> u64 {
        self.buffers
            .values()
            .fold(0, |acc, buffer| acc + buffer.analytics.allocated_memory)
    }

    /// Sum of the high-water marks of all buffers.
    pub fn get_total_used_memory(&self) -> u64 {
        self.buffers
            .values()
            .fold(0, |acc, buffer| acc + buffer.analytics.used_memory)
    }
}

impl BufferSink for RecordingBufferSink {
    fn ensure_capacity(&mut self, buffer_name: &'static str, size: u64) {
        let buffer = self.buffers.entry(buffer_name).or_default();
        if buffer.analytics.allocated_memory >= size {
            return;
        }
        if buffer.analytics.allocated_memory > 0 {
            buffer.analytics.times_grown += 1;
        }
        buffer.bytes.resize(size as usize, 0);
        buffer.analytics.allocated_memory = size;
    }

    fn write(&mut self, command: BufferWriteCommand) -> Result<(), BufferError> {
        let buffer = self
            .buffers
            .get_mut(command.buffer_name)
            .ok_or(BufferError::UnknownBuffer(command.buffer_name))?;

        let data = command.data.as_bytes();
        let offset = command.offset as usize;
        let end = offset + data.len();
        if end > buffer.bytes.len() {
            return Err(BufferError::OutOfBounds {
                offset,
                end,
                len: buffer.bytes.len(),
            });
        }

        buffer.bytes[offset..end].copy_from_slice(data);
        buffer.analytics.used_memory = buffer.analytics.used_memory.max(end as u64);
        buffer.analytics.times_written += 1;
        trace!("Applied {:?}", command);
        Ok(())
    }
}

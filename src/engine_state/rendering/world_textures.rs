//! Whole-world texture uploads.
//!
//! Besides the incremental side-quad geometry, the terrain shader samples three
//! world-sized arrays: raw block ids, the height index and the top-layer AO of
//! every chunk. These are not tracked per chunk; each one is re-sent in full
//! whenever its source changed since the previous upload.

use log::debug;

use crate::{
    engine_state::{
        buffer_state::{
            BufferSink, BufferWriteCommand, BLOCK_TEXTURE_NAME, HEIGHT_TEXTURE_NAME, TOP_AO_TEXTURE_NAME,
        },
        voxels::world::SharedWorld,
    },
    error::BufferError,
};

/// One of the world-sized arrays mirrored to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldLayer {
    Blocks,
    Heights,
    TopAo,
}

impl WorldLayer {
    pub fn buffer_name(self) -> &'static str {
        match self {
            WorldLayer::Blocks => BLOCK_TEXTURE_NAME,
            WorldLayer::Heights => HEIGHT_TEXTURE_NAME,
            WorldLayer::TopAo => TOP_AO_TEXTURE_NAME,
        }
    }
}

/// Remembers what was last uploaded and re-sends layers that changed.
#[derive(Debug, Default)]
pub struct WorldTextureUploader {
    uploaded_world_version: Option<u64>,
    uploaded_top_ao_revision: Option<u64>,
}

impl WorldTextureUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads the block and height layers if the world was written to, and the
    /// top AO layer if its revision moved.
    ///
    /// # Returns
    /// The layers that were uploaded
    pub fn upload_if_changed(
        &mut self,
        world: &SharedWorld,
        top_ao_map: &[u8],
        top_ao_revision: u64,
        sink: &mut dyn BufferSink,
    ) -> Result<Vec<WorldLayer>, BufferError> {
        let mut uploaded = Vec::new();

        let world_version = world.modification_ids().world_version();
        if self.uploaded_world_version != Some(world_version) {
            let (blocks, heights) = {
                let guard = world.read();
                (guard.blocks().to_vec(), guard.height_index().to_vec())
            };
            Self::upload(WorldLayer::Blocks, blocks, sink)?;
            Self::upload(WorldLayer::Heights, heights, sink)?;
            uploaded.extend([WorldLayer::Blocks, WorldLayer::Heights]);
            self.uploaded_world_version = Some(world_version);
        }

        if self.uploaded_top_ao_revision != Some(top_ao_revision) {
            Self::upload(WorldLayer::TopAo, top_ao_map.to_vec(), sink)?;
            uploaded.push(WorldLayer::TopAo);
            self.uploaded_top_ao_revision = Some(top_ao_revision);
        }

        if !uploaded.is_empty() {
            debug!("Uploaded world layers {:?}", uploaded);
        }
        Ok(uploaded)
    }

    fn upload<T>(layer: WorldLayer, data: Vec<T>, sink: &mut dyn BufferSink) -> Result<(), BufferError>
    where
        T: bytemuck::NoUninit + Send + Sync + 'static,
    {
        let bytes = std::mem::size_of_val(data.as_slice()) as u64;
        sink.ensure_capacity(layer.buffer_name(), bytes);
        sink.write(BufferWriteCommand::new(
            format!("{layer:?} layer"),
            layer.buffer_name(),
            0,
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{WorldLayer, WorldTextureUploader};
    use crate::engine_state::{
        buffer_state::{RecordingBufferSink, HEIGHT_TEXTURE_NAME},
        voxels::world::VoxelWorld,
    };

    #[test]
    fn layers_are_sent_only_after_a_change() {
        let world = VoxelWorld::new(4, 4, 4, 2).unwrap().share();
        let mut uploader = WorldTextureUploader::new();
        let mut sink = RecordingBufferSink::new();
        let top_ao = vec![0u8; 16];

        assert_eq!(
            uploader.upload_if_changed(&world, &top_ao, 0, &mut sink).unwrap(),
            vec![WorldLayer::Blocks, WorldLayer::Heights, WorldLayer::TopAo]
        );
        assert!(uploader.upload_if_changed(&world, &top_ao, 0, &mut sink).unwrap().is_empty());

        world.set_block(1, 2, 3, 1).unwrap();
        assert_eq!(
            uploader.upload_if_changed(&world, &top_ao, 0, &mut sink).unwrap(),
            vec![WorldLayer::Blocks, WorldLayer::Heights]
        );
        assert_eq!(
            uploader.upload_if_changed(&world, &top_ao, 1, &mut sink).unwrap(),
            vec![WorldLayer::TopAo]
        );

        // Height index is [x][z] as i32; column (1, 3) is entry 7.
        let heights = sink.bytes(HEIGHT_TEXTURE_NAME).unwrap();
        assert_eq!(i32::from_ne_bytes(heights[28..32].try_into().unwrap()), 2);
    }
}

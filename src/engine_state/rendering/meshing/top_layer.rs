//! Top-surface occlusion for every column of a chunk.
//!
//! Each column has exactly one visible top face, so the top layer is a dense byte
//! grid with one packed AO value per column. Corner order in the byte, from the low
//! bits up: north-west, south-west, south-east, north-east (north is -Z, west is -X).

use super::{
    ambient_occlusion::{compute_ao, pack_ao},
    snapshot::ChunkSnapshot,
};

/// Index of a column inside the top-layer array.
#[inline]
pub fn top_layer_index(local_x: i32, local_z: i32, chunk_size: i32) -> usize {
    (local_z * chunk_size + local_x) as usize
}

/// Builds the top-layer AO array, `chunk_size²` bytes.
///
/// A neighbor occludes a corner when its column is strictly taller than the column
/// being shaded; equal heights form a flat surface and contribute nothing.
pub fn build_top_layer(snapshot: &ChunkSnapshot) -> Vec<u8> {
    let chunk_size = snapshot.chunk_size();
    let mut top_ao = vec![0u8; (chunk_size * chunk_size) as usize];

    for local_z in 0..chunk_size {
        for local_x in 0..chunk_size {
            let height = snapshot.height(local_x, local_z);
            let taller = |dx: i32, dz: i32| snapshot.height(local_x + dx, local_z + dz) > height;

            let (west, east, north, south) = (taller(-1, 0), taller(1, 0), taller(0, -1), taller(0, 1));
            let corners = [
                compute_ao(west, north, taller(-1, -1)),
                compute_ao(west, south, taller(-1, 1)),
                compute_ao(east, south, taller(1, 1)),
                compute_ao(east, north, taller(1, -1)),
            ];
            top_ao[top_layer_index(local_x, local_z, chunk_size)] = pack_ao(corners);
        }
    }

    top_ao
}

#[cfg(test)]
mod tests {
    use super::{build_top_layer, top_layer_index};
    use crate::{
        config::GenerationMethod,
        engine_state::{
            rendering::meshing::{ambient_occlusion::unpack_ao, snapshot::ChunkSnapshot},
            voxels::world::VoxelWorld,
        },
    };

    #[test]
    fn flat_terrain_is_unoccluded() {
        let mut world = VoxelWorld::new(12, 8, 12, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 2 }).unwrap();
        let center = world.grid().chunk_index(1, 1).unwrap();

        let top_ao = build_top_layer(&ChunkSnapshot::capture(&world, center).unwrap());
        assert_eq!(top_ao.len(), 16);
        assert!(top_ao.iter().all(|&ao| ao == 0));
    }

    #[test]
    fn column_beside_a_pillar_is_darkened_on_the_facing_corners() {
        let mut world = VoxelWorld::new(8, 8, 8, 8).unwrap();
        world.generate(&GenerationMethod::Flat { height: 0 }).unwrap();
        world.set_block(4, 1, 4, 1).unwrap();
        world.set_block(4, 2, 4, 1).unwrap();
        let top_ao = build_top_layer(&ChunkSnapshot::capture(&world, 0).unwrap());

        // West of the pillar: its east edge is occluded, so south-east and north-east get one level each.
        let [nw, sw, se, ne] = unpack_ao(top_ao[top_layer_index(3, 4, 8)]);
        assert_eq!((nw, sw, se, ne), (0, 0, 1, 1));

        // Diagonal to the pillar: only the corner touching it picks up the diagonal term.
        let [nw, sw, se, ne] = unpack_ao(top_ao[top_layer_index(3, 3, 8)]);
        assert_eq!((nw, sw, se, ne), (0, 0, 1, 0));

        // The pillar itself is taller than everything around it.
        assert_eq!(top_ao[top_layer_index(4, 4, 8)], 0);
    }

    #[test]
    fn column_in_a_corner_pocket_saturates() {
        let mut world = VoxelWorld::new(4, 8, 4, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 0 }).unwrap();
        world.set_block(0, 3, 1, 1).unwrap();
        world.set_block(1, 3, 0, 1).unwrap();
        let top_ao = build_top_layer(&ChunkSnapshot::capture(&world, 0).unwrap());

        let [nw, _, _, _] = unpack_ao(top_ao[top_layer_index(1, 1, 4)]);
        assert_eq!(nw, 3);
    }
}

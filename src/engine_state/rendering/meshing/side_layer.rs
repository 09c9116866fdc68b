//! Vertical faces where neighboring columns differ in height.
//!
//! Every column is compared with its +X and +Z neighbor only, so each exposed
//! vertical face between two columns is emitted exactly once, by the column on
//! the -X/-Z side. Faces that look toward -X/-Z belong to the lower column and
//! carry the `needs_flip` flag so the shader can mirror their winding.

use bytemuck::{Pod, Zeroable};

use super::{
    ambient_occlusion::{compute_ao, pack_ao},
    snapshot::ChunkSnapshot,
};

/// Set on quads whose normal lies along Z.
pub const SIDE_FLAG_Z_AXIS: u8 = 0x80;
/// Set on quads that face the negative axis direction.
pub const SIDE_FLAG_NEEDS_FLIP: u8 = 0x40;
/// Bits of `flags` holding the upper nibble of the column index.
pub const SIDE_INDEX_HIGH_MASK: u8 = 0x0F;
/// Largest column index a side quad can address.
pub const MAX_SIDE_COLUMN_INDEX: u16 = 0x0FFF;

/// The horizontal axis a side face is perpendicular to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceAxis {
    X,
    Z,
}

impl FaceAxis {
    /// Offset to the neighbor column compared along this axis.
    fn step(self) -> (i32, i32) {
        match self {
            FaceAxis::X => (1, 0),
            FaceAxis::Z => (0, 1),
        }
    }

    /// Direction along the face, perpendicular to its normal.
    fn tangent(self) -> (i32, i32) {
        match self {
            FaceAxis::X => (0, 1),
            FaceAxis::Z => (1, 0),
        }
    }
}

/// One unit-height vertical face, packed into four bytes for the GPU.
///
/// # Layout
/// - `flags`: bit 7 Z-axis, bit 6 needs-flip, bits 0-3 the column index's high nibble
/// - `index_low`: low byte of the chunk-local column index (`local_z * chunk_size + local_x`)
/// - `base_height`: y of the block the face covers
/// - `ao`: four packed corner AO values, bottom-back first
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SideQuad {
    pub flags: u8,
    pub index_low: u8,
    pub base_height: u8,
    pub ao: u8,
}

impl SideQuad {
    pub fn new(axis: FaceAxis, needs_flip: bool, column_index: u16, base_height: u8, ao: u8) -> Self {
        debug_assert!(column_index <= MAX_SIDE_COLUMN_INDEX);
        let mut flags = ((column_index >> 8) as u8) & SIDE_INDEX_HIGH_MASK;
        if axis == FaceAxis::Z {
            flags |= SIDE_FLAG_Z_AXIS;
        }
        if needs_flip {
            flags |= SIDE_FLAG_NEEDS_FLIP;
        }
        Self {
            flags,
            index_low: column_index as u8,
            base_height,
            ao,
        }
    }

    pub fn axis(&self) -> FaceAxis {
        if self.flags & SIDE_FLAG_Z_AXIS != 0 {
            FaceAxis::Z
        } else {
            FaceAxis::X
        }
    }

    pub fn needs_flip(&self) -> bool {
        self.flags & SIDE_FLAG_NEEDS_FLIP != 0
    }

    pub fn column_index(&self) -> u16 {
        (((self.flags & SIDE_INDEX_HIGH_MASK) as u16) << 8) | self.index_low as u16
    }
}

/// Builds the side layer of a chunk.
///
/// For a column pair with heights `less < more`, one quad is emitted for every
/// block in `less + 1..=more`. Columns beyond the world edge count as ground level.
pub fn build_side_layer(snapshot: &ChunkSnapshot) -> Vec<SideQuad> {
    let chunk_size = snapshot.chunk_size();
    let mut quads = Vec::new();

    for local_z in 0..chunk_size {
        for local_x in 0..chunk_size {
            let height = snapshot.height(local_x, local_z);
            let column_index = (local_z * chunk_size + local_x) as u16;

            for axis in [FaceAxis::X, FaceAxis::Z] {
                let (dx, dz) = axis.step();
                let neighbor_height = snapshot.height(local_x + dx, local_z + dz);
                if neighbor_height == height {
                    continue;
                }

                let needs_flip = neighbor_height > height;
                // Occlusion is sampled around the air cell the face looks into.
                let (air_x, air_z) = if needs_flip {
                    (local_x, local_z)
                } else {
                    (local_x + dx, local_z + dz)
                };

                for y in height.min(neighbor_height) + 1..=height.max(neighbor_height) {
                    let ao = side_face_ao(snapshot, axis, air_x, air_z, y, needs_flip);
                    quads.push(SideQuad::new(axis, needs_flip, column_index, y as u8, ao));
                }
            }
        }
    }

    quads
}

/// Packed AO of one side face, from the cells around the air cell in front of it.
///
/// Corners go bottom-back, bottom-front, top-front, top-back, with "front" meaning
/// the positive tangent direction. Flipped faces swap front and back so the packed
/// order follows the mirrored winding.
fn side_face_ao(
    snapshot: &ChunkSnapshot,
    axis: FaceAxis,
    air_x: i32,
    air_z: i32,
    y: i32,
    needs_flip: bool,
) -> u8 {
    let (tx, tz) = axis.tangent();
    let solid = |along: i32, dy: i32| snapshot.is_solid(air_x + tx * along, y + dy, air_z + tz * along);

    let below = solid(0, -1);
    let above = solid(0, 1);
    let back = solid(-1, 0);
    let front = solid(1, 0);

    let bottom_back = compute_ao(below, back, solid(-1, -1));
    let bottom_front = compute_ao(below, front, solid(1, -1));
    let top_front = compute_ao(above, front, solid(1, 1));
    let top_back = compute_ao(above, back, solid(-1, 1));

    if needs_flip {
        pack_ao([bottom_front, bottom_back, top_back, top_front])
    } else {
        pack_ao([bottom_back, bottom_front, top_front, top_back])
    }
}

#[cfg(test)]
mod tests {
    use super::{build_side_layer, FaceAxis, SideQuad};
    use crate::{
        config::GenerationMethod,
        engine_state::{
            rendering::meshing::{ambient_occlusion::pack_ao, snapshot::ChunkSnapshot},
            voxels::world::VoxelWorld,
        },
    };

    fn flat_world(size: i32, chunk_size: i32) -> VoxelWorld {
        let mut world = VoxelWorld::new(size, 8, size, chunk_size).unwrap();
        world.generate(&GenerationMethod::Flat { height: 0 }).unwrap();
        world
    }

    fn raise_pillar(world: &mut VoxelWorld, x: i32, z: i32, top: i32) {
        for y in 1..=top {
            world.set_block(x, y, z, 1).unwrap();
        }
    }

    #[test]
    fn quad_fields_survive_packing() {
        let quad = SideQuad::new(FaceAxis::Z, true, 0x0ABC, 17, 0b11_01_00_10);
        assert_eq!(quad.axis(), FaceAxis::Z);
        assert!(quad.needs_flip());
        assert_eq!(quad.column_index(), 0x0ABC);
        assert_eq!(quad.flags, 0x80 | 0x40 | 0x0A);
        assert_eq!(quad.index_low, 0xBC);
        assert_eq!(bytemuck::bytes_of(&quad).len(), 4);
    }

    #[test]
    fn flat_interior_chunk_has_no_side_faces() {
        let mut world = VoxelWorld::new(12, 8, 12, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 3 }).unwrap();
        let center = world.grid().chunk_index(1, 1).unwrap();
        assert!(build_side_layer(&ChunkSnapshot::capture(&world, center).unwrap()).is_empty());
    }

    #[test]
    fn pillar_emits_one_quad_per_exposed_block_on_each_side() {
        let mut world = flat_world(8, 8);
        raise_pillar(&mut world, 4, 4, 2);
        let quads = build_side_layer(&ChunkSnapshot::capture(&world, 0).unwrap());

        assert_eq!(quads.len(), 8);
        let pillar_index = 4 * 8 + 4;
        let own = quads.iter().filter(|quad| quad.column_index() == pillar_index);
        assert!(own.clone().all(|quad| !quad.needs_flip()));
        assert_eq!(own.count(), 4);
        assert_eq!(quads.iter().filter(|quad| quad.needs_flip()).count(), 4);

        let mut heights: Vec<u8> = quads.iter().map(|quad| quad.base_height).collect();
        heights.sort_unstable();
        assert_eq!(heights, vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn ground_below_the_face_darkens_its_bottom_corners() {
        let mut world = flat_world(8, 8);
        raise_pillar(&mut world, 4, 4, 2);
        let quads = build_side_layer(&ChunkSnapshot::capture(&world, 0).unwrap());

        let east_face = |y: u8| {
            quads
                .iter()
                .find(|quad| {
                    quad.axis() == FaceAxis::X && !quad.needs_flip() && quad.base_height == y
                })
                .copied()
                .unwrap()
        };
        assert_eq!(east_face(1).ao, pack_ao([2, 2, 0, 0]));
        assert_eq!(east_face(2).ao, 0);
    }

    #[test]
    fn seam_faces_belong_to_the_lower_index_chunk() {
        let mut world = flat_world(8, 4);
        let grid = world.grid();
        // x = 3 is the last column of chunk (0, 0).
        raise_pillar(&mut world, 3, 1, 3);

        let west = build_side_layer(&ChunkSnapshot::capture(&world, grid.chunk_index(0, 0).unwrap()).unwrap());
        let east = build_side_layer(&ChunkSnapshot::capture(&world, grid.chunk_index(1, 0).unwrap()).unwrap());

        assert!(east.is_empty());
        // +X and +Z faces from the pillar, -X and -Z faces from its lower neighbors.
        assert_eq!(west.len(), 12);
    }

    #[test]
    fn world_edge_counts_as_ground_level() {
        let mut world = VoxelWorld::new(4, 8, 4, 4).unwrap();
        world.generate(&GenerationMethod::Flat { height: 2 }).unwrap();
        let quads = build_side_layer(&ChunkSnapshot::capture(&world, 0).unwrap());

        // Faces toward +X and +Z at the far edge, two blocks each, four columns per edge.
        assert_eq!(quads.len(), 16);
        assert!(quads.iter().all(|quad| !quad.needs_flip()));
    }
}

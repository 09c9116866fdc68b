//! Stand-in for the game simulation of the demo.
//!
//! The real simulation is out of scope for this crate; `BlockEditor` just makes
//! random edits so the render side has something to react to. It only ever goes
//! through `SharedWorld::set_block`, the same path a real simulation would use.

use crate::{
    engine_state::voxels::{block::block_type::BlockType, world::SharedWorld},
    error::WorldError,
};

/// Places and removes blocks on top of random columns.
pub struct BlockEditor {
    rng: fastrand::Rng,
    edits_per_step: usize,
}

impl BlockEditor {
    pub fn new(seed: u64, edits_per_step: usize) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            edits_per_step,
        }
    }

    /// Makes `edits_per_step` edits. Each picks a column and either stacks a block
    /// on it or removes its topmost one.
    ///
    /// # Returns
    /// The number of edits that changed the world
    pub fn step(&mut self, world: &SharedWorld) -> Result<usize, WorldError> {
        let mut changed = 0;
        let mut guard = world.write();
        let (size_x, size_y, size_z) = guard.size();

        for _ in 0..self.edits_per_step {
            let x = self.rng.i32(0..size_x);
            let z = self.rng.i32(0..size_z);
            let top = guard.get_highest_block_height(x, z)?;

            if self.rng.bool() {
                if top + 1 < size_y {
                    guard.set_block(x, top + 1, z, BlockType::WOOD.id())?;
                    changed += 1;
                }
            } else if top >= 0 {
                guard.set_block(x, top, z, BlockType::AIR.id())?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

//! Corner ambient occlusion shared by both mesh passes.

/// Occlusion level of a fully darkened corner.
pub const MAX_OCCLUSION: u8 = 3;

/// Occlusion of one quad corner from its two edge neighbors and the diagonal.
///
/// When both edge neighbors occlude, the corner is fully dark and the diagonal
/// cannot add anything; otherwise each occluder adds one level.
#[inline]
pub fn compute_ao(side1: bool, side2: bool, corner: bool) -> u8 {
    if side1 && side2 {
        MAX_OCCLUSION
    } else {
        side1 as u8 + side2 as u8 + corner as u8
    }
}

/// Packs four 2-bit corner values into one byte, first corner in the low bits.
#[inline]
pub fn pack_ao(corners: [u8; 4]) -> u8 {
    corners
        .iter()
        .enumerate()
        .fold(0, |packed, (i, &value)| packed | ((value & MAX_OCCLUSION) << (i * 2)))
}

/// Inverse of `pack_ao`.
#[inline]
pub fn unpack_ao(packed: u8) -> [u8; 4] {
    [0, 1, 2, 3].map(|i| (packed >> (i * 2)) & MAX_OCCLUSION)
}

//! The block tree-reduction schedule.
//!
//! One reduction block is 128 cooperating lanes, each contributing a 4-wide
//! partial sum. Active lanes are halved per step (64, 32, 16, 8, 4, 2, 1)
//! until slot 0 holds the total. Floating-point addition is non-associative,
//! so this exact tree shape is part of the kernel contract: the CPU
//! reference below is the single source of truth the WGSL kernel mirrors.

use crate::validation::BLOCK_SIZE;

/// Reduce 128 partial-sum vectors in place, returning the total.
///
/// Scratch contents above slot 0 are clobbered, like the workgroup scratch
/// on the GPU.
pub fn tree_reduce_block(partials: &mut [[f32; 4]; BLOCK_SIZE]) -> [f32; 4] {
    let mut stride = BLOCK_SIZE / 2;
    while stride > 0 {
        for i in 0..stride {
            let rhs = partials[i + stride];
            for lane in 0..4 {
                partials[i][lane] += rhs[lane];
            }
        }
        stride /= 2;
    }
    partials[0]
}

//! CPU reference for the int8 dequantize-matmul kernel.
//!
//! The weight matrix is row-major int8, 4 values packed per u32 word along
//! the channel axis. Dequantization is outer-product affine: scale and
//! offset both vary independently along rows (`ry`, `my`) and channels
//! (`rx`, `mx`), so recovering one element is a fused multiply-add
//!
//! ```text
//! value = (v / 255) * (ry[r] * rx[c]) + (my[r] + mx[c])
//! ```
//!
//! rather than a single global scale.
//!
//! The reference reproduces the GPU summation order exactly: 128 lanes each
//! accumulate a strided subset of channel groups, then the fixed tree
//! reduction in [`crate::ops::reduce`] combines them. Accumulation is f32
//! throughout; only the weights are quantized.

use crate::ops::reduce::tree_reduce_block;
use crate::packing::unpack4x8unorm;
use crate::validation::{validate_matmul_params, BLOCK_SIZE, LANE_GROUP};

/// `output[t, r] = Σ_c dequantize(w[r, c]) * input[t, c]` for every token
/// below `tokens` and every row. A token count of 0 leaves `output`
/// untouched.
#[allow(clippy::too_many_arguments)]
pub fn quant_matmul(
    matrix: &[u32],
    mx: &[f32],
    rx: &[f32],
    my: &[f32],
    ry: &[f32],
    input: &[f32],
    output: &mut [f32],
    channels: usize,
    rows: usize,
    tokens: usize,
) -> Result<(), String> {
    validate_matmul_params(
        channels,
        rows,
        tokens,
        matrix.len(),
        mx.len(),
        rx.len(),
        my.len(),
        ry.len(),
        input.len(),
        output.len(),
    )?;

    let stride = channels / LANE_GROUP;
    let row_groups = rows / LANE_GROUP;

    for token in 0..tokens {
        let x = &input[token * channels..(token + 1) * channels];
        for group in 0..row_groups {
            let mut partials = [[0.0f32; 4]; BLOCK_SIZE];
            for (lane, partial) in partials.iter_mut().enumerate() {
                let mut i = lane;
                while i < stride {
                    let xi = &x[i * LANE_GROUP..(i + 1) * LANE_GROUP];
                    for (r, sum) in partial.iter_mut().enumerate() {
                        let row = group * LANE_GROUP + r;
                        let w = unpack4x8unorm(matrix[row * stride + i]);
                        let mut dot = 0.0f32;
                        for l in 0..LANE_GROUP {
                            let c = i * LANE_GROUP + l;
                            let value = w[l].mul_add(ry[row] * rx[c], my[row] + mx[c]);
                            dot = value.mul_add(xi[l], dot);
                        }
                        *sum += dot;
                    }
                    i += BLOCK_SIZE;
                }
            }
            let total = tree_reduce_block(&mut partials);
            let out = &mut output[token * rows + group * LANE_GROUP..][..LANE_GROUP];
            out.copy_from_slice(&total);
        }
    }
    Ok(())
}

/// A weight matrix quantized for [`quant_matmul`].
#[derive(Debug, Clone)]
pub struct QuantizedMatrix {
    /// Packed int8 weights, 4 per u32 word, row-major.
    pub matrix: Vec<u32>,
    /// Per-channel offset.
    pub mx: Vec<f32>,
    /// Per-channel scale.
    pub rx: Vec<f32>,
    /// Per-row offset.
    pub my: Vec<f32>,
    /// Per-row scale.
    pub ry: Vec<f32>,
}

/// Quantize a row-major f32 matrix into the outer-product affine form.
///
/// Offsets absorb the row minima then the column minima; the remaining
/// non-negative matrix is factored by the column maxima then the row
/// maxima, leaving values in [0, 1] to be rounded onto the 255-step grid.
pub fn quantize_matrix(
    weights: &[f32],
    rows: usize,
    channels: usize,
) -> Result<QuantizedMatrix, String> {
    if rows == 0 || channels == 0 {
        return Err("Dimensions must be > 0".into());
    }
    if rows % LANE_GROUP != 0 || channels % LANE_GROUP != 0 {
        return Err(format!("rows and channels must be multiples of {LANE_GROUP}"));
    }
    if weights.len() != rows * channels {
        return Err(format!(
            "weights length mismatch: expected {}, got {}",
            rows * channels,
            weights.len()
        ));
    }

    let mut w = weights.to_vec();

    let mut my = vec![0.0f32; rows];
    for r in 0..rows {
        let row = &w[r * channels..(r + 1) * channels];
        my[r] = row.iter().fold(f32::INFINITY, |m, &v| m.min(v));
    }
    for r in 0..rows {
        for c in 0..channels {
            w[r * channels + c] -= my[r];
        }
    }

    let mut mx = vec![0.0f32; channels];
    for c in 0..channels {
        let mut min = f32::INFINITY;
        for r in 0..rows {
            min = min.min(w[r * channels + c]);
        }
        mx[c] = min;
    }
    for r in 0..rows {
        for c in 0..channels {
            w[r * channels + c] -= mx[c];
        }
    }

    let mut rx = vec![0.0f32; channels];
    for c in 0..channels {
        let mut max = 0.0f32;
        for r in 0..rows {
            max = max.max(w[r * channels + c]);
        }
        rx[c] = if max > 0.0 { max } else { 1.0 };
    }
    for r in 0..rows {
        for c in 0..channels {
            w[r * channels + c] /= rx[c];
        }
    }

    let mut ry = vec![0.0f32; rows];
    for r in 0..rows {
        let row = &w[r * channels..(r + 1) * channels];
        let max = row.iter().fold(0.0f32, |m, &v| m.max(v));
        ry[r] = if max > 0.0 { max } else { 1.0 };
    }

    let stride = channels / LANE_GROUP;
    let mut matrix = vec![0u32; rows * stride];
    for r in 0..rows {
        for i in 0..stride {
            let mut word = 0u32;
            for l in 0..LANE_GROUP {
                let unit = w[r * channels + i * LANE_GROUP + l] / ry[r];
                let q = (unit * 255.0).round().clamp(0.0, 255.0) as u32;
                word |= q << (8 * l);
            }
            matrix[r * stride + i] = word;
        }
    }

    Ok(QuantizedMatrix {
        matrix,
        mx,
        rx,
        my,
        ry,
    })
}

/// Recover one weight element; exposed for tests and host-side inspection.
#[inline]
pub fn dequantize(q: &QuantizedMatrix, row: usize, channel: usize, channels: usize) -> f32 {
    let stride = channels / LANE_GROUP;
    let word = q.matrix[row * stride + channel / LANE_GROUP];
    let unorm = unpack4x8unorm(word)[channel % LANE_GROUP];
    unorm.mul_add(q.ry[row] * q.rx[channel], q.my[row] + q.mx[channel])
}

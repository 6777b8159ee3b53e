//! CPU reference for the elementwise activation kernels.
//!
//! Four stateless transforms applied to every channel of a
//! (batch, token, channel) tensor, in place. Two storage layouts exist:
//! full-precision f32 lanes, and packed half precision where each 4-channel
//! group is two u32 words of f16 pairs. Packed groups are unpacked to f32,
//! transformed, and repacked, so both layouts share the same math.

use crate::packing::{pack4x16float, unpack4x16float};
use crate::validation::validate_activation_shape;

/// Selector for the elementwise transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// `max(x, 0)^2`
    SquaredRelu,
    /// `tanh(x)`
    Tanh,
    /// `exp(-exp(x))`, finite for large inputs because the inner
    /// exponential is negated before the outer one.
    StableExp,
    /// `-exp(x)`
    NegExp,
}

impl Activation {
    #[inline(always)]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::SquaredRelu => {
                let p = x.max(0.0);
                p * p
            }
            Activation::Tanh => x.tanh(),
            Activation::StableExp => (-x.exp()).exp(),
            Activation::NegExp => -x.exp(),
        }
    }
}

/// Apply `kind` to every channel of a full-precision tensor in place.
///
/// `data` is batch-major, then token, then channel; `channels` must be a
/// multiple of 4.
pub fn activate_inplace(
    kind: Activation,
    data: &mut [f32],
    channels: usize,
    tokens: usize,
    batches: usize,
) -> Result<(), String> {
    validate_activation_shape(channels, tokens, batches, data.len())?;
    for x in data.iter_mut() {
        *x = kind.apply(*x);
    }
    Ok(())
}

/// Apply `kind` to every channel of a packed-half tensor in place.
///
/// `data` holds two f16 lanes per u32 word, so its length is half the lane
/// count of the logical tensor.
pub fn activate_packed_inplace(
    kind: Activation,
    data: &mut [u32],
    channels: usize,
    tokens: usize,
    batches: usize,
) -> Result<(), String> {
    validate_activation_shape(channels, tokens, batches, data.len() * 2)?;
    for words in data.chunks_exact_mut(2) {
        let mut p = unpack4x16float([words[0], words[1]]);
        for lane in p.iter_mut() {
            *lane = kind.apply(*lane);
        }
        let packed = pack4x16float(p);
        words[0] = packed[0];
        words[1] = packed[1];
    }
    Ok(())
}

//! Bit-exact CPU mirrors of the WGSL packing builtins.
//!
//! The GPU kernels store 4-wide channel groups either as `vec4<f32>` or as
//! `vec2<u32>` holding two IEEE-754 binary16 pairs, and decode int8 weights
//! with `unpack4x8unorm`. These helpers reproduce those conversions so the
//! CPU references and tests operate on the same bit layout.

use half::f16;

/// Pack 4 f32 lanes into 2 u32 words of f16 pairs.
///
/// Matches WGSL `pack2x16float` applied to `(v.xy, v.zw)`: the lower lane
/// of each pair occupies the low half-word.
#[inline(always)]
pub fn pack4x16float(v: [f32; 4]) -> [u32; 2] {
    [pack2x16float(v[0], v[1]), pack2x16float(v[2], v[3])]
}

/// Unpack 2 u32 words of f16 pairs into 4 f32 lanes.
#[inline(always)]
pub fn unpack4x16float(w: [u32; 2]) -> [f32; 4] {
    let (a, b) = unpack2x16float(w[0]);
    let (c, d) = unpack2x16float(w[1]);
    [a, b, c, d]
}

#[inline(always)]
pub fn pack2x16float(lo: f32, hi: f32) -> u32 {
    let lo = f16::from_f32(lo).to_bits() as u32;
    let hi = f16::from_f32(hi).to_bits() as u32;
    lo | (hi << 16)
}

#[inline(always)]
pub fn unpack2x16float(w: u32) -> (f32, f32) {
    let lo = f16::from_bits((w & 0xFFFF) as u16).to_f32();
    let hi = f16::from_bits((w >> 16) as u16).to_f32();
    (lo, hi)
}

/// Decode a u32 of 4 packed bytes into unit-interval floats (`byte / 255`),
/// lowest byte first. Matches WGSL `unpack4x8unorm`.
#[inline(always)]
pub fn unpack4x8unorm(w: u32) -> [f32; 4] {
    [
        (w & 0xFF) as f32 / 255.0,
        ((w >> 8) & 0xFF) as f32 / 255.0,
        ((w >> 16) & 0xFF) as f32 / 255.0,
        (w >> 24) as f32 / 255.0,
    ]
}

/// Pack 4 bytes into a u32, lowest byte first. Inverse of [`unpack4x8unorm`]
/// up to the unit-interval scaling; used to build weight words in tests.
#[inline(always)]
pub fn pack4x8(b: [u8; 4]) -> u32 {
    (b[0] as u32) | ((b[1] as u32) << 8) | ((b[2] as u32) << 16) | ((b[3] as u32) << 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_f16_round_trip_within_half_precision() {
        // Representative range: zero, subnormal-small, moderate, large.
        let cases = [
            [0.0f32, -0.0, 1.0, -1.0],
            [1e-4, -1e-4, 0.5, -0.5],
            [3.14159, -2.71828, 123.456, -654.321],
            [1024.0, -2048.0, 30000.0, -30000.0],
        ];
        for v in cases {
            let rt = unpack4x16float(pack4x16float(v));
            for (a, b) in v.iter().zip(rt.iter()) {
                if *a == 0.0 {
                    assert_eq!(*b, 0.0);
                } else {
                    let rel = (a - b).abs() / a.abs();
                    assert!(rel <= 2.0f32.powi(-11), "lane {a} -> {b}, rel {rel}");
                }
            }
        }
    }

    #[test]
    fn pack2x16float_low_half_is_first_lane() {
        let w = pack2x16float(1.0, 2.0);
        assert_eq!((w & 0xFFFF) as u16, f16::from_f32(1.0).to_bits());
        assert_eq!((w >> 16) as u16, f16::from_f32(2.0).to_bits());
    }

    #[test]
    fn unpack4x8unorm_unit_interval() {
        let d = unpack4x8unorm(pack4x8([0, 128, 255, 1]));
        assert_eq!(d[0], 0.0);
        assert!((d[1] - 128.0 / 255.0).abs() < 1e-7);
        assert_eq!(d[2], 1.0);
        assert!((d[3] - 1.0 / 255.0).abs() < 1e-7);
    }
}

//! Validation helpers for kernel parameters.
//!
//! All functions return `Result<T, String>` so each API surface can convert
//! failures into its own error type. Overflow checks use `checked_mul`.
//! The GPU kernels themselves never validate: out-of-range lanes guard and
//! skip, and shape invariants are the caller's contract.

/// Lanes per channel/row group. Every channel and row count must be a
/// multiple of this.
pub const LANE_GROUP: usize = 4;

/// Cooperating lanes per matmul reduction block.
pub const BLOCK_SIZE: usize = 128;

#[inline]
pub fn checked_mul(a: usize, b: usize, name: &str) -> Result<usize, String> {
    a.checked_mul(b).ok_or_else(|| format!("{name} overflow"))
}

#[inline]
pub fn validate_input_len(actual: usize, expected: usize, name: &str) -> Result<(), String> {
    if actual != expected {
        return Err(format!(
            "{name} length mismatch: expected {expected}, got {actual}"
        ));
    }
    Ok(())
}

#[inline]
pub fn validate_min_len(actual: usize, expected: usize, name: &str) -> Result<(), String> {
    if actual < expected {
        return Err(format!(
            "{name} too short: need at least {expected}, got {actual}"
        ));
    }
    Ok(())
}

/// Validate an activation tensor shape (channels, tokens, batches) against
/// a buffer of `len` f32 lanes (or f16 lanes for the packed layout).
#[inline]
pub fn validate_activation_shape(
    channels: usize,
    tokens: usize,
    batches: usize,
    len: usize,
) -> Result<(), String> {
    if channels == 0 || tokens == 0 || batches == 0 {
        return Err("Dimensions must be > 0".into());
    }
    if channels % LANE_GROUP != 0 {
        return Err(format!("channels must be multiple of {LANE_GROUP}"));
    }
    let expected = checked_mul(checked_mul(channels, tokens, "tensor")?, batches, "tensor")?;
    validate_input_len(len, expected, "tensor")
}

/// Validate quantized matmul dimensions and buffer lengths.
///
/// `matrix_words` is the packed weight length in u32 words (4 int8 values
/// each); `mx`/`rx` are per-channel, `my`/`ry` per-row, grouped in 4s.
#[allow(clippy::too_many_arguments)]
#[inline]
pub fn validate_matmul_params(
    channels: usize,
    rows: usize,
    tokens: usize,
    matrix_words: usize,
    mx_len: usize,
    rx_len: usize,
    my_len: usize,
    ry_len: usize,
    input_len: usize,
    output_len: usize,
) -> Result<(), String> {
    if channels == 0 || rows == 0 {
        return Err("Dimensions must be > 0".into());
    }
    if channels % LANE_GROUP != 0 {
        return Err(format!("channels must be multiple of {LANE_GROUP}"));
    }
    if rows % LANE_GROUP != 0 {
        return Err(format!("rows must be multiple of {LANE_GROUP}"));
    }
    let expected_words = checked_mul(rows, channels / LANE_GROUP, "matrix")?;
    validate_input_len(matrix_words, expected_words, "matrix")?;
    validate_input_len(mx_len, channels, "mx")?;
    validate_input_len(rx_len, channels, "rx")?;
    validate_input_len(my_len, rows, "my")?;
    validate_input_len(ry_len, rows, "ry")?;
    // Padded dispatch grids are allowed: buffers may extend past the valid
    // token range, they are simply never touched there.
    validate_min_len(input_len, checked_mul(tokens, channels, "input")?, "input")?;
    validate_min_len(output_len, checked_mul(tokens, rows, "output")?, "output")?;
    Ok(())
}

//! wlm-kernels: the GPU-resident numeric core of a tensor-inference runtime.
//!
//! Two kernel families, both data-parallel over a 3D grid of lanes:
//! - **Activation**: four stateless elementwise transforms (squared-ReLU,
//!   tanh, stabilized double-exp, negated exp) applied in place to a
//!   (batch, token, channel) tensor, with full-precision and packed-half
//!   storage variants selected per pipeline, never per element.
//! - **Quantized MatMul**: dequantizes an int8 weight matrix on the fly
//!   with outer-product affine scale/offset vectors, multiplies against a
//!   float input batch, and tree-reduces partial sums across a 128-lane
//!   workgroup.
//!
//! The GPU kernels are WGSL compute shaders behind `wgpu` host wrappers;
//! bit-faithful CPU references live under [`ops`] and back the tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use wlm_kernels::{Activation, WgpuActivation, ActivationShape};
//!
//! let kernel = WgpuActivation::new(device, queue);
//! kernel.forward_inplace(ActivationShape::new(4096, 16, 1), Activation::SquaredRelu, &buffer);
//! ```

pub mod ops;
pub mod packing;
pub mod validation;
pub mod wgpu_kernels;

pub use ops::activation::{activate_inplace, activate_packed_inplace, Activation};
pub use ops::quant_matmul::{dequantize, quant_matmul, quantize_matrix, QuantizedMatrix};
pub use ops::reduce::tree_reduce_block;
pub use validation::{BLOCK_SIZE, LANE_GROUP};
pub use wgpu_kernels::{
    ActivationError, ActivationShape, QuantMatmulError, QuantMatmulParams, WgpuActivation,
    WgpuQuantMatmul,
};

//! WGPU kernel integrations: WGSL compute shaders plus host wrappers.

pub mod activation;
pub mod quant_matmul;

pub use activation::{ActivationError, ActivationShape, WgpuActivation};
pub use quant_matmul::{QuantMatmulError, QuantMatmulParams, WgpuQuantMatmul};

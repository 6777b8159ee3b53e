pub mod activation;
pub mod quant_matmul;
pub mod reduce;

pub use activation::Activation;

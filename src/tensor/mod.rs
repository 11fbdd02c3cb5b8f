//! Parameter tensors and execution context
//!
//! Parameters carry their own `requires_grad` flag and gradient slot. Nothing
//! here differentiates: gradient values are produced by the training framework
//! driving the model. Freezing a tensor is permanent.

mod context;
mod param;


pub use context::Context;
pub use param::Tensor;

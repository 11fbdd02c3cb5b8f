//! # Renacido: multi-student self-distillation
//!
//! A shared residual-network stem feeds several student tails of shrinking
//! width. The sum of the student logits acts as a synthesized teacher, and
//! students are trained jointly against it and against each other's
//! intermediate features.
//!
//! ## Architecture
//!
//! - **tensor**: Parameter tensors, gradient slots and execution mode
//! - **nn**: Convolution, batch norm, pooling and linear layers
//! - **resnet**: Residual blocks, backbone presets, base and student tails
//! - **ensemble**: The multi-student network and its forward pass
//! - **distill**: Teacher, intermediate and student loss terms
//! - **config**: Declarative YAML experiment configuration
//! - **io**: SafeTensors weight loading and partial state transfer

pub mod config;
pub mod distill;
pub mod ensemble;
pub mod io;
pub mod nn;
pub mod resnet;
pub mod tensor;

pub mod error;

// Re-export commonly used types
pub use config::{EnsembleConfig, ModelSpec};
pub use ensemble::{EnsembleOutput, MultiStudentNet};
pub use error::{Error, Result};
pub use tensor::{Context, Tensor};

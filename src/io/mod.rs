//! Weight I/O
//!
//! Named tensors travel as a [`StateDict`] and are stored in SafeTensors
//! files, the format pretrained residual network checkpoints ship in.

mod filter;
mod load;
mod save;


use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Tensors keyed by dotted parameter name
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

pub use filter::{base_state, is_student_only_key, STUDENT_ONLY_STAGES};
pub use load::{load_safetensors, read_safetensors_metadata};
pub use save::save_safetensors;

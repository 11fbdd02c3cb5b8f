//! Reading SafeTensors files

use super::StateDict;
use crate::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::Dtype;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

/// Load every tensor of a SafeTensors file
///
/// Only F32 tensors are supported. Integer batch-norm step counters
/// (`*.num_batches_tracked`) are dropped; any other dtype is a
/// serialization error.
pub fn load_safetensors(path: impl AsRef<Path>) -> Result<StateDict> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let mut state = StateDict::new();
    for (name, view) in tensors.tensors() {
        if view.dtype() != Dtype::F32 {
            if name.ends_with("num_batches_tracked") {
                tracing::debug!(tensor = %name, dtype = ?view.dtype(), "skipping step counter");
                continue;
            }
            return Err(Error::Serialization(format!(
                "Tensor {name} has dtype {:?}, only F32 is supported",
                view.dtype()
            )));
        }
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)?;
        state.insert(name, array);
    }

    tracing::debug!(path = %path.display(), tensors = state.len(), "loaded safetensors");
    Ok(state)
}

/// Free-form string metadata stored in a SafeTensors header
pub fn read_safetensors_metadata(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let data = std::fs::read(path.as_ref())?;
    let (_, header) = SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    Ok(header.metadata().clone().unwrap_or_default())
}

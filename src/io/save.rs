//! Writing SafeTensors files

use super::StateDict;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::Path;

/// Save every tensor of `state` as little-endian F32
///
/// ```no_run
/// use renacido::io::{save_safetensors, StateDict};
/// use ndarray::{ArrayD, IxDyn};
///
/// let mut state = StateDict::new();
/// state.insert("fc.bias".to_string(), ArrayD::zeros(IxDyn(&[10])));
/// save_safetensors(&state, "student.safetensors", None)?;
/// # Ok::<(), renacido::Error>(())
/// ```
pub fn save_safetensors(
    state: &StateDict,
    path: impl AsRef<Path>,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let path = path.as_ref();

    // Owned, contiguous bytes for every tensor; views borrow from these
    let tensor_data: Vec<(&str, Vec<u8>, Vec<usize>)> = state
        .iter()
        .map(|(name, array)| {
            let values: Vec<f32> = array.iter().copied().collect();
            let bytes = bytemuck::cast_slice::<f32, u8>(&values).to_vec();
            (name.as_str(), bytes, array.shape().to_vec())
        })
        .collect();

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| Error::Serialization(format!("Invalid tensor {name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = safetensors::serialize(views, metadata)
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;

    tracing::debug!(path = %path.display(), tensors = state.len(), "saved safetensors");
    Ok(())
}

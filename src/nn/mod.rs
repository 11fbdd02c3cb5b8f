//! Layer library
//!
//! Convolution, batch normalization, pooling and linear layers over
//! `ndarray` feature maps laid out as `(batch, channels, height, width)`.
//!
//! Every layer implements [`Module`], which walks its learnable parameters and
//! buffers under PyTorch-compatible dotted names. State transfer, parameter
//! counting and freezing are all built on that walk.

mod conv;
pub mod init;
mod linear;
mod norm;
mod pool;

pub use conv::{Conv2d, Conv2dOptions};
pub use linear::Linear;
pub use norm::BatchNorm2d;
pub use pool::{global_avg_pool, max_pool2d};

use crate::io::StateDict;
use crate::{Error, Result, Tensor};
use ndarray::{Array, Dimension};
use std::collections::BTreeMap;

/// Whether a named tensor is learned or a running statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Parameter,
    Buffer,
}

/// Anything that owns named tensors
pub trait Module {
    /// Visit every named tensor under `prefix`
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor));

    /// Visit every named tensor under `prefix` mutably
    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor));

    /// Number of learnable scalars
    fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.visit("", &mut |_, kind, t| {
            if kind == StateKind::Parameter {
                count += t.len();
            }
        });
        count
    }

    /// Number of learnable scalars that still track gradients
    fn num_trainable_parameters(&self) -> usize {
        let mut count = 0;
        self.visit("", &mut |_, kind, t| {
            if kind == StateKind::Parameter && t.requires_grad() {
                count += t.len();
            }
        });
        count
    }

    /// Names of learnable parameters in traversal order
    fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit("", &mut |name, kind, _| {
            if kind == StateKind::Parameter {
                names.push(name.to_string());
            }
        });
        names
    }

    /// Copy of every parameter and buffer
    fn state_dict(&self) -> StateDict {
        let mut state = BTreeMap::new();
        self.visit("", &mut |name, _, t| {
            state.insert(name.to_string(), t.data().clone());
        });
        state
    }

    /// Strictly load parameters and buffers by name
    ///
    /// Every tensor of the module must be present with a matching shape and
    /// no foreign keys may remain. `num_batches_tracked` counters are ignored.
    /// Gradient flags are left untouched. Returns the loaded names.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<Vec<String>> {
        let mut expected: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        self.visit("", &mut |name, _, t| {
            expected.insert(name.to_string(), t.shape().to_vec());
        });

        let missing: Vec<String> = expected
            .keys()
            .filter(|name| !state.contains_key(*name))
            .cloned()
            .collect();
        let unexpected: Vec<String> = state
            .keys()
            .filter(|name| !expected.contains_key(*name) && !name.ends_with("num_batches_tracked"))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(Error::StateMismatch {
                missing,
                unexpected,
            });
        }

        for (name, shape) in &expected {
            let got = state[name].shape();
            if got != shape.as_slice() {
                return Err(Error::ShapeMismatch {
                    expected: shape.clone(),
                    got: got.to_vec(),
                });
            }
        }

        let mut loaded = Vec::with_capacity(expected.len());
        self.visit_mut("", &mut |name, _, t| {
            if let Some(src) = state.get(name) {
                t.data_mut().assign(src);
                loaded.push(name.to_string());
            }
        });
        Ok(loaded)
    }

    /// Permanently disable gradient tracking for every parameter
    fn freeze(&mut self) {
        self.visit_mut("", &mut |_, kind, t| {
            if kind == StateKind::Parameter {
                t.freeze();
            }
        });
    }

    /// True when no parameter tracks gradients
    fn is_frozen(&self) -> bool {
        let mut frozen = true;
        self.visit("", &mut |_, kind, t| {
            if kind == StateKind::Parameter && t.requires_grad() {
                frozen = false;
            }
        });
        frozen
    }
}

/// Join a parent prefix and a child name with a dot
pub fn child(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Rectified linear activation, in place
pub fn relu<D: Dimension>(mut x: Array<f32, D>) -> Array<f32, D> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

//! Fully connected layer

use super::{child, init, Module, StateKind};
use crate::{Error, Result, Tensor};
use ndarray::{Array2, Ix1, Ix2};
use rand::Rng;

/// `y = x W^T + b` with weight `[out, in]` and bias `[out]`
pub struct Linear {
    weight: Tensor,
    bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Result<Self> {
        if out_features == 0 {
            return Err(Error::ConfigError(
                "linear layer needs at least one output".to_string(),
            ));
        }
        Ok(Self {
            weight: init::uniform_fan_in(&[out_features, in_features], in_features, rng)?,
            bias: init::uniform_fan_in(&[out_features], in_features, rng)?,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.in_features {
            return Err(Error::ShapeMismatch {
                expected: vec![x.nrows(), self.in_features],
                got: x.shape().to_vec(),
            });
        }
        let weight = self.weight.data().view().into_dimensionality::<Ix2>()?;
        let bias = self.bias.data().view().into_dimensionality::<Ix1>()?;
        Ok(x.dot(&weight.t()) + &bias)
    }
}

impl Module for Linear {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &self.weight);
        f(&child(prefix, "bias"), StateKind::Parameter, &self.bias);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &mut self.weight);
        f(&child(prefix, "bias"), StateKind::Parameter, &mut self.bias);
    }
}

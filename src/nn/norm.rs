//! Batch normalization over the channel axis

use super::{child, Module, StateKind};
use crate::{Context, Error, Result, Tensor};
use ndarray::{s, Array4, Axis};

const EPS: f32 = 1e-5;
const MOMENTUM: f32 = 0.1;

/// Batch normalization for `(batch, channels, h, w)` feature maps
///
/// Learnable `weight`/`bias` start at 1/0; running mean/variance buffers start
/// at 0/1 and follow an exponential moving average with momentum 0.1.
pub struct BatchNorm2d {
    weight: Tensor,
    bias: Tensor,
    running_mean: Tensor,
    running_var: Tensor,
    num_features: usize,
}

impl BatchNorm2d {
    pub fn new(num_features: usize) -> Self {
        Self {
            weight: Tensor::ones(&[num_features], true),
            bias: Tensor::zeros(&[num_features], true),
            running_mean: Tensor::zeros(&[num_features], false),
            running_var: Tensor::ones(&[num_features], false),
            num_features,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Zero the scale so the normalized branch starts as zero
    pub fn zero_weight(&mut self) {
        self.weight.data_mut().fill(0.0);
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        if c != self.num_features {
            return Err(Error::ShapeMismatch {
                expected: vec![n, self.num_features, h, w],
                got: x.shape().to_vec(),
            });
        }

        let (mean, var) = if ctx.is_training() {
            let count = n * h * w;
            if count <= 1 {
                return Err(Error::InvalidParameter(format!(
                    "batch norm in training mode needs more than 1 value per channel, got input {:?}",
                    x.shape()
                )));
            }
            let (mean, var) = batch_statistics(x);
            self.update_running(&mean, &var, count);
            (mean, var)
        } else {
            (
                self.running_mean.data().iter().copied().collect(),
                self.running_var.data().iter().copied().collect(),
            )
        };

        let gamma: Vec<f32> = self.weight.data().iter().copied().collect();
        let beta: Vec<f32> = self.bias.data().iter().copied().collect();

        let mut out = x.clone();
        for (ch, mut plane) in out.axis_iter_mut(Axis(1)).enumerate() {
            let scale = gamma[ch] / (var[ch] + EPS).sqrt();
            let shift = beta[ch] - mean[ch] * scale;
            plane.mapv_inplace(|v| v * scale + shift);
        }
        Ok(out)
    }

    fn update_running(&mut self, mean: &[f32], var: &[f32], count: usize) {
        // running variance tracks the unbiased estimate
        let correction = count as f32 / (count - 1) as f32;
        for (rm, &m) in self.running_mean.data_mut().iter_mut().zip(mean) {
            *rm = (1.0 - MOMENTUM) * *rm + MOMENTUM * m;
        }
        for (rv, &v) in self.running_var.data_mut().iter_mut().zip(var) {
            *rv = (1.0 - MOMENTUM) * *rv + MOMENTUM * v * correction;
        }
    }
}

/// Per-channel mean and biased variance
fn batch_statistics(x: &Array4<f32>) -> (Vec<f32>, Vec<f32>) {
    let channels = x.dim().1;
    (0..channels)
        .map(|ch| {
            let plane = x.slice(s![.., ch, .., ..]);
            let count = plane.len() as f32;
            let mean = plane.sum() / count;
            let var = plane.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / count;
            (mean, var)
        })
        .unzip()
}

impl Module for BatchNorm2d {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &self.weight);
        f(&child(prefix, "bias"), StateKind::Parameter, &self.bias);
        f(&child(prefix, "running_mean"), StateKind::Buffer, &self.running_mean);
        f(&child(prefix, "running_var"), StateKind::Buffer, &self.running_var);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &mut self.weight);
        f(&child(prefix, "bias"), StateKind::Parameter, &mut self.bias);
        f(
            &child(prefix, "running_mean"),
            StateKind::Buffer,
            &mut self.running_mean,
        );
        f(
            &child(prefix, "running_var"),
            StateKind::Buffer,
            &mut self.running_var,
        );
    }
}

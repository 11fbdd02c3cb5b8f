//! Shared stem and first residual stage

use super::preset::BackboneSpec;
use super::stage::{Stage, StageBuilder};
use crate::nn::{child, max_pool2d, relu, BatchNorm2d, Conv2d, Conv2dOptions, Module, StateKind};
use crate::{Context, Error, Result, Tensor};
use ndarray::Array4;
use rand::Rng;

/// Channels produced by the stem convolution
pub const STEM_WIDTH: usize = 64;

/// Input channels expected by the stem
pub const INPUT_CHANNELS: usize = 3;

/// conv1 -> bn1 -> relu -> maxpool -> layer1
///
/// Parameter names match the corresponding entries of a pretrained
/// single-network checkpoint, so a filtered checkpoint loads directly.
pub struct Base {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    layer1: Stage,
}

impl Base {
    pub fn new<R: Rng>(spec: &BackboneSpec, rng: &mut R) -> Result<Self> {
        let conv1 = Conv2d::new(
            INPUT_CHANNELS,
            STEM_WIDTH,
            7,
            Conv2dOptions::default().stride(2).padding(3),
            rng,
        )?;
        let mut builder = StageBuilder::new(STEM_WIDTH, spec.groups, spec.width_per_group);
        let layer1 = builder.build(spec.block, STEM_WIDTH, spec.depths[0], 1, false, rng)?;
        Ok(Self {
            conv1,
            bn1: BatchNorm2d::new(STEM_WIDTH),
            layer1,
        })
    }

    /// Width of the feature map handed to every student
    pub fn out_channels(&self) -> usize {
        self.layer1.out_channels()
    }

    pub fn layer1(&self) -> &Stage {
        &self.layer1
    }

    pub fn zero_init_residual(&mut self) {
        self.layer1.zero_init_residual();
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let channels = x.dim().1;
        if channels != INPUT_CHANNELS {
            return Err(Error::ShapeMismatch {
                expected: vec![x.dim().0, INPUT_CHANNELS, x.dim().2, x.dim().3],
                got: x.shape().to_vec(),
            });
        }
        let out = self.conv1.forward(x)?;
        let out = relu(self.bn1.forward(&out, ctx)?);
        let out = max_pool2d(&out)?;
        self.layer1.forward(&out, ctx)
    }
}

impl Module for Base {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.conv1.visit(&child(prefix, "conv1"), f);
        self.bn1.visit(&child(prefix, "bn1"), f);
        self.layer1.visit(&child(prefix, "layer1"), f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.conv1.visit_mut(&child(prefix, "conv1"), f);
        self.bn1.visit_mut(&child(prefix, "bn1"), f);
        self.layer1.visit_mut(&child(prefix, "layer1"), f);
    }
}

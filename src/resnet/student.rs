//! Student tails: layer2, layer3, layer4, pooling and classifier

use super::base::STEM_WIDTH;
use super::preset::BackboneSpec;
use super::stage::{Stage, StageBuilder};
use crate::nn::{child, global_avg_pool, Linear, Module, StateKind};
use crate::{Context, Result, Tensor};
use ndarray::{Array2, Array4};
use rand::Rng;

/// Logits plus the output of each student stage
#[derive(Debug, Clone)]
pub struct StudentOutput {
    /// `(batch, num_classes)`
    pub logits: Array2<f32>,
    /// Outputs of layer2, layer3 and layer4
    pub features: [Array4<f32>; 3],
}

/// One student network on top of the shared base
pub struct Student {
    layer2: Stage,
    layer3: Stage,
    layer4: Stage,
    fc: Linear,
    widths: [usize; 3],
}

impl Student {
    /// Build a student with stage widths `widths` (before block expansion)
    ///
    /// Each of the three stages has stride 2 unless the matching entry of
    /// `dilate` replaces that stride with dilation.
    pub fn new<R: Rng>(
        spec: &BackboneSpec,
        widths: [usize; 3],
        num_classes: usize,
        dilate: [bool; 3],
        rng: &mut R,
    ) -> Result<Self> {
        let kind = spec.block;
        let mut builder = StageBuilder::new(
            STEM_WIDTH * kind.expansion(),
            spec.groups,
            spec.width_per_group,
        );
        let layer2 = builder.build(kind, widths[0], spec.depths[1], 2, dilate[0], rng)?;
        let layer3 = builder.build(kind, widths[1], spec.depths[2], 2, dilate[1], rng)?;
        let layer4 = builder.build(kind, widths[2], spec.depths[3], 2, dilate[2], rng)?;
        let fc = Linear::new(layer4.out_channels(), num_classes, rng)?;
        Ok(Self {
            layer2,
            layer3,
            layer4,
            fc,
            widths,
        })
    }

    pub fn widths(&self) -> [usize; 3] {
        self.widths
    }

    /// Channels of the three stage outputs
    pub fn feature_channels(&self) -> [usize; 3] {
        [
            self.layer2.out_channels(),
            self.layer3.out_channels(),
            self.layer4.out_channels(),
        ]
    }

    pub fn num_classes(&self) -> usize {
        self.fc.out_features()
    }

    pub fn zero_init_residual(&mut self) {
        self.layer2.zero_init_residual();
        self.layer3.zero_init_residual();
        self.layer4.zero_init_residual();
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<StudentOutput> {
        let f2 = self.layer2.forward(x, ctx)?;
        let f3 = self.layer3.forward(&f2, ctx)?;
        let f4 = self.layer4.forward(&f3, ctx)?;
        let pooled = global_avg_pool(&f4)?;
        let logits = self.fc.forward(&pooled)?;
        Ok(StudentOutput {
            logits,
            features: [f2, f3, f4],
        })
    }
}

impl Module for Student {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.layer2.visit(&child(prefix, "layer2"), f);
        self.layer3.visit(&child(prefix, "layer3"), f);
        self.layer4.visit(&child(prefix, "layer4"), f);
        self.fc.visit(&child(prefix, "fc"), f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.layer2.visit_mut(&child(prefix, "layer2"), f);
        self.layer3.visit_mut(&child(prefix, "layer3"), f);
        self.layer4.visit_mut(&child(prefix, "layer4"), f);
        self.fc.visit_mut(&child(prefix, "fc"), f);
    }
}

//! Residual stages (sequences of blocks)

use super::block::{Block, BlockKind, BlockParams, Downsample};
use crate::nn::{child, Module, StateKind};
use crate::{Context, Result, Tensor};
use ndarray::Array4;
use rand::Rng;

/// An ordered run of residual blocks, named `0`, `1`, ... in state dicts
pub struct Stage {
    blocks: Vec<Block>,
    out_channels: usize,
}

impl Stage {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn zero_init_residual(&mut self) {
        self.blocks.iter_mut().for_each(Block::zero_init_residual);
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let mut blocks = self.blocks.iter_mut();
        let Some(first) = blocks.next() else {
            return Ok(x.clone());
        };
        let out = first.forward(x, ctx)?;
        blocks.try_fold(out, |acc, block| block.forward(&acc, ctx))
    }
}

impl Module for Stage {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        for (i, block) in self.blocks.iter().enumerate() {
            block.visit(&child(prefix, &i.to_string()), f);
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.visit_mut(&child(prefix, &i.to_string()), f);
        }
    }
}

/// Builds consecutive stages, threading input width and dilation through
///
/// Replacing a stage's stride with dilation multiplies the running dilation by
/// that stride and runs the stage at stride 1. The first block of a stage uses
/// the dilation in effect before the stage; later blocks use the updated one.
#[derive(Debug, Clone)]
pub struct StageBuilder {
    inplanes: usize,
    dilation: usize,
    groups: usize,
    base_width: usize,
}

impl StageBuilder {
    pub fn new(inplanes: usize, groups: usize, base_width: usize) -> Self {
        Self {
            inplanes,
            dilation: 1,
            groups,
            base_width,
        }
    }

    /// Channel count the next stage will receive
    pub fn inplanes(&self) -> usize {
        self.inplanes
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn build<R: Rng>(
        &mut self,
        kind: BlockKind,
        planes: usize,
        num_blocks: usize,
        stride: usize,
        dilate: bool,
        rng: &mut R,
    ) -> Result<Stage> {
        let previous_dilation = self.dilation;
        let stride = if dilate {
            self.dilation *= stride;
            1
        } else {
            stride
        };

        let out_channels = planes * kind.expansion();
        let downsample = if stride != 1 || self.inplanes != out_channels {
            Some(Downsample::new(self.inplanes, out_channels, stride, rng)?)
        } else {
            None
        };

        let mut blocks = Vec::with_capacity(num_blocks);
        let first = BlockParams {
            inplanes: self.inplanes,
            planes,
            stride,
            groups: self.groups,
            base_width: self.base_width,
            dilation: previous_dilation,
        };
        blocks.push(Block::new(kind, &first, downsample, rng)?);
        self.inplanes = out_channels;

        for _ in 1..num_blocks {
            let rest = BlockParams {
                inplanes: self.inplanes,
                planes,
                stride: 1,
                groups: self.groups,
                base_width: self.base_width,
                dilation: self.dilation,
            };
            blocks.push(Block::new(kind, &rest, None, rng)?);
        }

        Ok(Stage {
            blocks,
            out_channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_downsample_only_on_first_block() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(64, 1, 64);
        let stage = builder
            .build(BlockKind::Bottleneck, 16, 3, 2, false, &mut rng)
            .unwrap();
        assert_eq!(stage.len(), 3);
        assert!(stage.blocks()[0].has_downsample());
        assert!(!stage.blocks()[1].has_downsample());
        assert!(!stage.blocks()[2].has_downsample());
        assert_eq!(stage.out_channels(), 64);
        assert_eq!(builder.inplanes(), 64);
    }

    #[test]
    fn test_no_downsample_when_shapes_match() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(8, 1, 64);
        let stage = builder
            .build(BlockKind::Basic, 8, 2, 1, false, &mut rng)
            .unwrap();
        assert!(!stage.blocks()[0].has_downsample());
    }

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(4, 1, 64);
        let mut stage = builder
            .build(BlockKind::Basic, 8, 2, 2, false, &mut rng)
            .unwrap();
        let x = Array4::<f32>::ones((2, 4, 4, 4));
        let y = stage.forward(&x, &Context::new()).unwrap();
        assert_eq!(y.dim(), (2, 8, 2, 2));
    }

    #[test]
    fn test_dilation_replaces_stride() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(16, 1, 64);
        let mut stage = builder
            .build(BlockKind::Bottleneck, 4, 2, 2, true, &mut rng)
            .unwrap();
        assert_eq!(builder.dilation(), 2);

        let x = Array4::<f32>::ones((2, 16, 4, 4));
        let y = stage.forward(&x, &Context::new()).unwrap();
        assert_eq!(y.dim(), (2, 16, 4, 4));
    }

    #[test]
    fn test_dilated_basic_stage_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(8, 1, 64);
        // first block keeps dilation 1, second would need dilation 2
        let result = builder.build(BlockKind::Basic, 8, 2, 2, true, &mut rng);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_names_are_indexed() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut builder = StageBuilder::new(4, 1, 64);
        let stage = builder
            .build(BlockKind::Basic, 8, 2, 2, false, &mut rng)
            .unwrap();
        let names = stage.parameter_names();
        assert!(names.contains(&"0.downsample.0.weight".to_string()));
        assert!(names.contains(&"1.conv2.weight".to_string()));
    }
}

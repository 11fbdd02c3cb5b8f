//! Residual blocks

use crate::nn::{child, relu, BatchNorm2d, Conv2d, Conv2dOptions, Module, StateKind};
use crate::{Context, Error, Result, Tensor};
use ndarray::Array4;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Residual block variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Two 3x3 convolutions
    Basic,
    /// 1x1 reduce, 3x3, 1x1 expand
    Bottleneck,
}

impl BlockKind {
    /// Ratio of output channels to `planes`
    pub const fn expansion(self) -> usize {
        match self {
            BlockKind::Basic => 1,
            BlockKind::Bottleneck => 4,
        }
    }
}

/// Construction parameters shared by both block variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockParams {
    pub inplanes: usize,
    pub planes: usize,
    pub stride: usize,
    pub groups: usize,
    pub base_width: usize,
    pub dilation: usize,
}

/// 3x3 convolution with padding equal to dilation
pub fn conv3x3<R: Rng>(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
    groups: usize,
    dilation: usize,
    rng: &mut R,
) -> Result<Conv2d> {
    Conv2d::new(
        in_planes,
        out_planes,
        3,
        Conv2dOptions::default()
            .stride(stride)
            .padding(dilation)
            .groups(groups)
            .dilation(dilation),
        rng,
    )
}

/// 1x1 convolution
pub fn conv1x1<R: Rng>(
    in_planes: usize,
    out_planes: usize,
    stride: usize,
    rng: &mut R,
) -> Result<Conv2d> {
    Conv2d::new(
        in_planes,
        out_planes,
        1,
        Conv2dOptions::default().stride(stride),
        rng,
    )
}

/// Projection shortcut: 1x1 convolution + normalization
///
/// Named `downsample.0` / `downsample.1` in state dicts.
pub struct Downsample {
    conv: Conv2d,
    bn: BatchNorm2d,
}

impl Downsample {
    pub fn new<R: Rng>(
        inplanes: usize,
        outplanes: usize,
        stride: usize,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(Self {
            conv: conv1x1(inplanes, outplanes, stride, rng)?,
            bn: BatchNorm2d::new(outplanes),
        })
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let out = self.conv.forward(x)?;
        self.bn.forward(&out, ctx)
    }
}

impl Module for Downsample {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.conv.visit(&child(prefix, "0"), f);
        self.bn.visit(&child(prefix, "1"), f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.conv.visit_mut(&child(prefix, "0"), f);
        self.bn.visit_mut(&child(prefix, "1"), f);
    }
}

/// Add the shortcut to the residual branch and apply the final ReLU
fn merge_shortcut(
    branch: Array4<f32>,
    x: &Array4<f32>,
    downsample: Option<&mut Downsample>,
    ctx: &Context,
) -> Result<Array4<f32>> {
    let identity = match downsample {
        Some(ds) => ds.forward(x, ctx)?,
        None => x.clone(),
    };
    if identity.dim() != branch.dim() {
        return Err(Error::ShapeMismatch {
            expected: branch.shape().to_vec(),
            got: identity.shape().to_vec(),
        });
    }
    Ok(relu(branch + &identity))
}

/// Two-convolution residual block
pub struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    downsample: Option<Downsample>,
}

impl BasicBlock {
    pub fn new<R: Rng>(
        params: &BlockParams,
        downsample: Option<Downsample>,
        rng: &mut R,
    ) -> Result<Self> {
        if params.groups != 1 || params.base_width != 64 {
            return Err(Error::ConfigError(
                "BasicBlock only supports groups=1 and base_width=64".to_string(),
            ));
        }
        if params.dilation > 1 {
            return Err(Error::ConfigError(
                "Dilation > 1 not supported in BasicBlock".to_string(),
            ));
        }
        Ok(Self {
            conv1: conv3x3(params.inplanes, params.planes, params.stride, 1, 1, rng)?,
            bn1: BatchNorm2d::new(params.planes),
            conv2: conv3x3(params.planes, params.planes, 1, 1, 1, rng)?,
            bn2: BatchNorm2d::new(params.planes),
            downsample,
        })
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let out = self.conv1.forward(x)?;
        let out = relu(self.bn1.forward(&out, ctx)?);
        let out = self.conv2.forward(&out)?;
        let out = self.bn2.forward(&out, ctx)?;
        merge_shortcut(out, x, self.downsample.as_mut(), ctx)
    }
}

impl Module for BasicBlock {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.conv1.visit(&child(prefix, "conv1"), f);
        self.bn1.visit(&child(prefix, "bn1"), f);
        self.conv2.visit(&child(prefix, "conv2"), f);
        self.bn2.visit(&child(prefix, "bn2"), f);
        if let Some(ds) = &self.downsample {
            ds.visit(&child(prefix, "downsample"), f);
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.conv1.visit_mut(&child(prefix, "conv1"), f);
        self.bn1.visit_mut(&child(prefix, "bn1"), f);
        self.conv2.visit_mut(&child(prefix, "conv2"), f);
        self.bn2.visit_mut(&child(prefix, "bn2"), f);
        if let Some(ds) = &mut self.downsample {
            ds.visit_mut(&child(prefix, "downsample"), f);
        }
    }
}

/// Three-convolution residual block with 4x channel expansion
pub struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    conv3: Conv2d,
    bn3: BatchNorm2d,
    downsample: Option<Downsample>,
}

impl Bottleneck {
    /// Inner width: `floor(planes * base_width / 64) * groups`
    pub fn inner_width(planes: usize, base_width: usize, groups: usize) -> usize {
        planes * base_width / 64 * groups
    }

    pub fn new<R: Rng>(
        params: &BlockParams,
        downsample: Option<Downsample>,
        rng: &mut R,
    ) -> Result<Self> {
        let width = Self::inner_width(params.planes, params.base_width, params.groups);
        if width == 0 {
            return Err(Error::ConfigError(format!(
                "Bottleneck with planes={} base_width={} groups={} has zero inner width",
                params.planes, params.base_width, params.groups
            )));
        }
        let out = params.planes * BlockKind::Bottleneck.expansion();
        Ok(Self {
            conv1: conv1x1(params.inplanes, width, 1, rng)?,
            bn1: BatchNorm2d::new(width),
            conv2: conv3x3(
                width,
                width,
                params.stride,
                params.groups,
                params.dilation,
                rng,
            )?,
            bn2: BatchNorm2d::new(width),
            conv3: conv1x1(width, out, 1, rng)?,
            bn3: BatchNorm2d::new(out),
            downsample,
        })
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        let out = self.conv1.forward(x)?;
        let out = relu(self.bn1.forward(&out, ctx)?);
        let out = self.conv2.forward(&out)?;
        let out = relu(self.bn2.forward(&out, ctx)?);
        let out = self.conv3.forward(&out)?;
        let out = self.bn3.forward(&out, ctx)?;
        merge_shortcut(out, x, self.downsample.as_mut(), ctx)
    }
}

impl Module for Bottleneck {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        self.conv1.visit(&child(prefix, "conv1"), f);
        self.bn1.visit(&child(prefix, "bn1"), f);
        self.conv2.visit(&child(prefix, "conv2"), f);
        self.bn2.visit(&child(prefix, "bn2"), f);
        self.conv3.visit(&child(prefix, "conv3"), f);
        self.bn3.visit(&child(prefix, "bn3"), f);
        if let Some(ds) = &self.downsample {
            ds.visit(&child(prefix, "downsample"), f);
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        self.conv1.visit_mut(&child(prefix, "conv1"), f);
        self.bn1.visit_mut(&child(prefix, "bn1"), f);
        self.conv2.visit_mut(&child(prefix, "conv2"), f);
        self.bn2.visit_mut(&child(prefix, "bn2"), f);
        self.conv3.visit_mut(&child(prefix, "conv3"), f);
        self.bn3.visit_mut(&child(prefix, "bn3"), f);
        if let Some(ds) = &mut self.downsample {
            ds.visit_mut(&child(prefix, "downsample"), f);
        }
    }
}

/// Either residual block variant
pub enum Block {
    Basic(BasicBlock),
    Bottleneck(Bottleneck),
}

impl Block {
    pub fn new<R: Rng>(
        kind: BlockKind,
        params: &BlockParams,
        downsample: Option<Downsample>,
        rng: &mut R,
    ) -> Result<Self> {
        Ok(match kind {
            BlockKind::Basic => Block::Basic(BasicBlock::new(params, downsample, rng)?),
            BlockKind::Bottleneck => {
                Block::Bottleneck(Bottleneck::new(params, downsample, rng)?)
            }
        })
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Basic(_) => BlockKind::Basic,
            Block::Bottleneck(_) => BlockKind::Bottleneck,
        }
    }

    pub fn has_downsample(&self) -> bool {
        match self {
            Block::Basic(b) => b.downsample.is_some(),
            Block::Bottleneck(b) => b.downsample.is_some(),
        }
    }

    /// Zero the last normalization scale so the block starts as an identity
    pub fn zero_init_residual(&mut self) {
        match self {
            Block::Basic(b) => b.bn2.zero_weight(),
            Block::Bottleneck(b) => b.bn3.zero_weight(),
        }
    }

    pub fn forward(&mut self, x: &Array4<f32>, ctx: &Context) -> Result<Array4<f32>> {
        match self {
            Block::Basic(b) => b.forward(x, ctx),
            Block::Bottleneck(b) => b.forward(x, ctx),
        }
    }
}

impl Module for Block {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        match self {
            Block::Basic(b) => b.visit(prefix, f),
            Block::Bottleneck(b) => b.visit(prefix, f),
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        match self {
            Block::Basic(b) => b.visit_mut(prefix, f),
            Block::Bottleneck(b) => b.visit_mut(prefix, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(inplanes: usize, planes: usize, stride: usize) -> BlockParams {
        BlockParams {
            inplanes,
            planes,
            stride,
            groups: 1,
            base_width: 64,
            dilation: 1,
        }
    }

    fn input(c: usize, hw: usize) -> Array4<f32> {
        Array::from_shape_fn((2, c, hw, hw), |(b, ch, i, j)| {
            ((b + 2 * ch + 3 * i + 5 * j) % 7) as f32 - 3.0
        })
    }

    #[test]
    fn test_basic_block_identity_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut block = Block::new(BlockKind::Basic, &params(8, 8, 1), None, &mut rng).unwrap();
        let y = block.forward(&input(8, 4), &Context::new()).unwrap();
        assert_eq!(y.dim(), (2, 8, 4, 4));
        assert!(y.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_bottleneck_downsample_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let ds = Downsample::new(16, 32, 2, &mut rng).unwrap();
        let mut block =
            Block::new(BlockKind::Bottleneck, &params(16, 8, 2), Some(ds), &mut rng).unwrap();
        let y = block.forward(&input(16, 4), &Context::new()).unwrap();
        assert_eq!(y.dim(), (2, 32, 2, 2));
    }

    #[test]
    fn test_missing_downsample_is_shape_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut block = Block::new(BlockKind::Basic, &params(8, 16, 1), None, &mut rng).unwrap();
        assert!(matches!(
            block.forward(&input(8, 4), &Context::new()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_basic_block_rejects_groups_width_and_dilation() {
        let mut rng = StdRng::seed_from_u64(0);
        let grouped = BlockParams {
            groups: 32,
            ..params(8, 8, 1)
        };
        let wide = BlockParams {
            base_width: 128,
            ..params(8, 8, 1)
        };
        let dilated = BlockParams {
            dilation: 2,
            ..params(8, 8, 1)
        };
        for p in [grouped, wide, dilated] {
            assert!(matches!(
                BasicBlock::new(&p, None, &mut rng),
                Err(Error::ConfigError(_))
            ));
        }
    }

    #[test]
    fn test_bottleneck_inner_width() {
        assert_eq!(Bottleneck::inner_width(64, 64, 1), 64);
        assert_eq!(Bottleneck::inner_width(64, 4, 32), 128);
        assert_eq!(Bottleneck::inner_width(128, 128, 1), 256);
        assert_eq!(Bottleneck::inner_width(8, 4, 32), 0);

        let mut rng = StdRng::seed_from_u64(0);
        let p = BlockParams {
            groups: 32,
            base_width: 4,
            ..params(32, 8, 1)
        };
        assert!(Bottleneck::new(&p, None, &mut rng).is_err());
    }

    #[test]
    fn test_zero_init_residual_makes_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut block = Block::new(BlockKind::Basic, &params(4, 4, 1), None, &mut rng).unwrap();
        block.zero_init_residual();
        let x = input(4, 3).mapv(f32::abs);
        let y = block.forward(&x, &Context::new()).unwrap();
        assert_eq!(y, x);
    }

    #[test]
    fn test_state_names() {
        let mut rng = StdRng::seed_from_u64(0);
        let ds = Downsample::new(8, 32, 1, &mut rng).unwrap();
        let block =
            Block::new(BlockKind::Bottleneck, &params(8, 8, 1), Some(ds), &mut rng).unwrap();
        let names = block.parameter_names();
        assert_eq!(names.first().map(String::as_str), Some("conv1.weight"));
        assert!(names.contains(&"bn3.bias".to_string()));
        assert!(names.contains(&"downsample.0.weight".to_string()));
        assert!(names.contains(&"downsample.1.weight".to_string()));
        assert!(block.state_dict().contains_key("downsample.1.running_var"));
    }
}

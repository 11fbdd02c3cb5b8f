//! Two-dimensional convolution

use super::{child, init, Module, StateKind};
use crate::{Error, Result, Tensor};
use ndarray::{s, Array2, Array4, Ix2};
use rand::Rng;

/// Geometry of a square-kernel convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dOptions {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
}

impl Default for Conv2dOptions {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            dilation: 1,
            groups: 1,
        }
    }
}

impl Conv2dOptions {
    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }
}

/// Bias-free 2D convolution with weight `[out, in / groups, k, k]`
pub struct Conv2d {
    weight: Tensor,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    options: Conv2dOptions,
}

impl Conv2d {
    /// Create a convolution with Kaiming fan-out initialized weights
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        options: Conv2dOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let Conv2dOptions {
            stride,
            dilation,
            groups,
            ..
        } = options;
        if in_channels == 0 || out_channels == 0 || kernel_size == 0 {
            return Err(Error::ConfigError(format!(
                "conv2d needs non-zero sizes, got in={in_channels} out={out_channels} k={kernel_size}"
            )));
        }
        if stride == 0 || dilation == 0 || groups == 0 {
            return Err(Error::ConfigError(
                "conv2d stride, dilation and groups must be > 0".to_string(),
            ));
        }
        if in_channels % groups != 0 || out_channels % groups != 0 {
            return Err(Error::ConfigError(format!(
                "channels ({in_channels} -> {out_channels}) not divisible by groups {groups}"
            )));
        }

        let weight = init::kaiming_normal_fan_out(
            &[out_channels, in_channels / groups, kernel_size, kernel_size],
            rng,
        )?;

        Ok(Self {
            weight,
            in_channels,
            out_channels,
            kernel_size,
            options,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn options(&self) -> Conv2dOptions {
        self.options
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Spatial output size for an `h x w` input
    pub fn output_size(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let Conv2dOptions {
            stride,
            padding,
            dilation,
            ..
        } = self.options;
        let span = dilation * (self.kernel_size - 1) + 1;
        if h + 2 * padding < span || w + 2 * padding < span {
            return Err(Error::InvalidParameter(format!(
                "input {h}x{w} smaller than dilated kernel span {span}"
            )));
        }
        Ok((
            (h + 2 * padding - span) / stride + 1,
            (w + 2 * padding - span) / stride + 1,
        ))
    }

    /// Convolve a `(batch, in_channels, h, w)` feature map
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        if c != self.in_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![n, self.in_channels, h, w],
                got: x.shape().to_vec(),
            });
        }
        let (oh, ow) = self.output_size(h, w)?;
        let Conv2dOptions {
            stride,
            padding,
            dilation,
            groups,
        } = self.options;
        let k = self.kernel_size;
        let cg = self.in_channels / groups;
        let og = self.out_channels / groups;

        let weight = self
            .weight
            .data()
            .view()
            .into_shape_with_order((self.out_channels, cg * k * k))?
            .into_dimensionality::<Ix2>()?;

        let mut out = Array4::<f32>::zeros((n, self.out_channels, oh, ow));
        for b in 0..n {
            for g in 0..groups {
                // im2col: one row per (input channel, ky, kx), one column per output pixel
                let mut cols = Array2::<f32>::zeros((cg * k * k, oh * ow));
                for ci in 0..cg {
                    let plane = x.slice(s![b, g * cg + ci, .., ..]);
                    for ky in 0..k {
                        for kx in 0..k {
                            let row = (ci * k + ky) * k + kx;
                            for oy in 0..oh {
                                let iy = (oy * stride + ky * dilation) as isize - padding as isize;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                for ox in 0..ow {
                                    let ix =
                                        (ox * stride + kx * dilation) as isize - padding as isize;
                                    if ix < 0 || ix >= w as isize {
                                        continue;
                                    }
                                    cols[[row, oy * ow + ox]] = plane[[iy as usize, ix as usize]];
                                }
                            }
                        }
                    }
                }

                let wg = weight.slice(s![g * og..(g + 1) * og, ..]);
                let res = wg.dot(&cols).into_shape_with_order((og, oh, ow))?;
                out.slice_mut(s![b, g * og..(g + 1) * og, .., ..])
                    .assign(&res);
            }
        }
        Ok(out)
    }
}

impl Module for Conv2d {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &self.weight);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        f(&child(prefix, "weight"), StateKind::Parameter, &mut self.weight);
    }
}

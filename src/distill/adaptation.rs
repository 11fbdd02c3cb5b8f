//! 1x1 projections from narrower student features onto the widest student

use crate::nn::{child, Conv2d, Conv2dOptions, Module, StateKind};
use crate::{Error, Result, Tensor};
use ndarray::Array4;
use rand::Rng;

/// `layers[k][j - 1]` maps stage `k` of student `j` to the width of student 0,
/// or is `None` when the widths already agree
pub struct AdaptationLayers {
    layers: [Vec<Option<Conv2d>>; 3],
}

impl AdaptationLayers {
    /// Build projections for students with the given stage output channels,
    /// widest (reference) student first
    pub fn new<R: Rng>(feature_channels: &[[usize; 3]], rng: &mut R) -> Result<Self> {
        let Some((reference, rest)) = feature_channels.split_first() else {
            return Err(Error::InvalidParameter(
                "adaptation needs at least one student".to_string(),
            ));
        };

        let mut layers: [Vec<Option<Conv2d>>; 3] = Default::default();
        for (k, stage) in layers.iter_mut().enumerate() {
            for channels in rest {
                let conv = if channels[k] == reference[k] {
                    None
                } else {
                    Some(Conv2d::new(
                        channels[k],
                        reference[k],
                        1,
                        Conv2dOptions::default(),
                        rng,
                    )?)
                };
                stage.push(conv);
            }
        }
        Ok(Self { layers })
    }

    /// Projection for stage `k` of student `j` (j >= 1), if one exists
    pub fn get(&self, k: usize, j: usize) -> Option<&Conv2d> {
        let idx = j.checked_sub(1)?;
        self.layers.get(k)?.get(idx)?.as_ref()
    }

    /// Number of projection convolutions
    pub fn len(&self) -> usize {
        self.layers.iter().flatten().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Project `feature` when a projection exists; otherwise `None`
    pub fn project(&self, k: usize, j: usize, feature: &Array4<f32>) -> Option<Result<Array4<f32>>> {
        self.get(k, j).map(|conv| conv.forward(feature))
    }
}

impl Module for AdaptationLayers {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        for (k, stage) in self.layers.iter().enumerate() {
            let stage_prefix = child(prefix, &k.to_string());
            for (i, conv) in stage.iter().enumerate() {
                if let Some(conv) = conv {
                    conv.visit(&child(&stage_prefix, &(i + 1).to_string()), f);
                }
            }
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        for (k, stage) in self.layers.iter_mut().enumerate() {
            let stage_prefix = child(prefix, &k.to_string());
            for (i, conv) in stage.iter_mut().enumerate() {
                if let Some(conv) = conv {
                    conv.visit_mut(&child(&stage_prefix, &(i + 1).to_string()), f);
                }
            }
        }
    }
}

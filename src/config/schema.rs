//! YAML schema definitions for experiment configuration

use crate::resnet::{Backbone, DEFAULT_STAGE_WIDTHS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete experiment file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Network topology
    pub model: ModelSpec,

    /// Distillation objective
    #[serde(default)]
    pub loss: LossSpec,
}

/// How student logits combine into the teacher signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Raw elementwise sum of every student's logits
    #[default]
    Sum,
    /// Sum of each student's logits scaled by its contribution weight
    Weighted,
}

/// Raw, unvalidated network description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Depth preset
    pub backbone: Backbone,

    /// Classifier outputs per student
    pub num_classes: usize,

    /// Number of student tails
    #[serde(default = "default_num_students")]
    pub num_students: usize,

    /// How many of the last stages shrink with student rank (1..=3)
    #[serde(default = "default_shrinking_stages")]
    pub shrinking_stages: usize,

    /// Stage widths of the widest student, before block expansion
    #[serde(default = "default_stage_widths")]
    pub stage_widths: [usize; 3],

    /// Replace the stride of layer2, layer3, layer4 with dilation
    #[serde(default = "default_dilation")]
    pub replace_stride_with_dilation: Vec<bool>,

    /// Permanently stop gradient tracking on the shared base
    #[serde(default)]
    pub freeze_base: bool,

    /// Start every residual branch as an identity mapping
    #[serde(default)]
    pub zero_init_residual: bool,

    #[serde(default)]
    pub aggregation: Aggregation,

    /// Safetensors checkpoint of a full single network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretrained: Option<PathBuf>,

    /// Seed for parameter initialization
    #[serde(default)]
    pub seed: u64,
}

/// Loss composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossSpec {
    /// Weights of teacher cross-entropy, intermediate MSE and student KL
    #[serde(default = "default_contribution_ratios")]
    pub contribution_ratios: Vec<f32>,

    /// Softening temperature for the student KL term
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Project narrower student features with a 1x1 convolution
    #[serde(default = "default_true")]
    pub adaptation: bool,
}

impl Default for LossSpec {
    fn default() -> Self {
        Self {
            contribution_ratios: default_contribution_ratios(),
            temperature: default_temperature(),
            adaptation: true,
        }
    }
}

fn default_num_students() -> usize {
    4
}

fn default_shrinking_stages() -> usize {
    3
}

fn default_stage_widths() -> [usize; 3] {
    DEFAULT_STAGE_WIDTHS
}

fn default_dilation() -> Vec<bool> {
    vec![false; 3]
}

fn default_contribution_ratios() -> Vec<f32> {
    vec![1.0, 1.0, 1.0]
}

fn default_temperature() -> f32 {
    3.0
}

fn default_true() -> bool {
    true
}

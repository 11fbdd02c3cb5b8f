//! Backbone depth presets

use super::block::BlockKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported residual backbones
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backbone {
    #[serde(rename = "resnet18")]
    ResNet18,
    #[serde(rename = "resnet34")]
    ResNet34,
    #[serde(rename = "resnet50")]
    ResNet50,
    #[serde(rename = "resnet101")]
    ResNet101,
    #[serde(rename = "resnet152")]
    ResNet152,
    #[serde(rename = "resnext50_32x4d")]
    ResNeXt50_32x4d,
    #[serde(rename = "resnext101_32x8d")]
    ResNeXt101_32x8d,
    #[serde(rename = "wide_resnet50_2")]
    WideResNet50_2,
    #[serde(rename = "wide_resnet101_2")]
    WideResNet101_2,
}

/// Block type, per-stage depth and convolution grouping of a backbone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackboneSpec {
    pub block: BlockKind,
    /// Blocks in the stem stage followed by the three student stages
    pub depths: [usize; 4],
    pub groups: usize,
    pub width_per_group: usize,
}

impl Backbone {
    pub const ALL: [Backbone; 9] = [
        Backbone::ResNet18,
        Backbone::ResNet34,
        Backbone::ResNet50,
        Backbone::ResNet101,
        Backbone::ResNet152,
        Backbone::ResNeXt50_32x4d,
        Backbone::ResNeXt101_32x8d,
        Backbone::WideResNet50_2,
        Backbone::WideResNet101_2,
    ];

    pub const fn spec(self) -> BackboneSpec {
        use BlockKind::{Basic, Bottleneck};

        let (block, depths, groups, width_per_group) = match self {
            Backbone::ResNet18 => (Basic, [2, 2, 2, 2], 1, 64),
            Backbone::ResNet34 => (Basic, [3, 4, 6, 3], 1, 64),
            Backbone::ResNet50 => (Bottleneck, [3, 4, 6, 3], 1, 64),
            Backbone::ResNet101 => (Bottleneck, [3, 4, 23, 3], 1, 64),
            Backbone::ResNet152 => (Bottleneck, [3, 8, 36, 3], 1, 64),
            Backbone::ResNeXt50_32x4d => (Bottleneck, [3, 4, 6, 3], 32, 4),
            Backbone::ResNeXt101_32x8d => (Bottleneck, [3, 4, 23, 3], 32, 8),
            Backbone::WideResNet50_2 => (Bottleneck, [3, 4, 6, 3], 1, 128),
            Backbone::WideResNet101_2 => (Bottleneck, [3, 4, 23, 3], 1, 128),
        };
        BackboneSpec {
            block,
            depths,
            groups,
            width_per_group,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Backbone::ResNet18 => "resnet18",
            Backbone::ResNet34 => "resnet34",
            Backbone::ResNet50 => "resnet50",
            Backbone::ResNet101 => "resnet101",
            Backbone::ResNet152 => "resnet152",
            Backbone::ResNeXt50_32x4d => "resnext50_32x4d",
            Backbone::ResNeXt101_32x8d => "resnext101_32x8d",
            Backbone::WideResNet50_2 => "wide_resnet50_2",
            Backbone::WideResNet101_2 => "wide_resnet101_2",
        }
    }
}

impl fmt::Display for Backbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

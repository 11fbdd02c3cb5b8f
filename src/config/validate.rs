//! Configuration validation
//!
//! Raw specs are checked once here and turned into configs whose fields can
//! be trusted by every constructor downstream.

use super::schema::{Aggregation, ExperimentSpec, LossSpec, ModelSpec};
use crate::resnet::{Backbone, BackboneSpec, BlockKind, Bottleneck, ChannelSchedule};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Validation error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid number of classes: {0} (must be > 0)")]
    InvalidNumClasses(usize),

    #[error("Invalid number of students: must be > 0")]
    NoStudents,

    #[error("Invalid shrinking stages: {0} (must be 1, 2 or 3)")]
    InvalidShrinkingStages(usize),

    #[error("Invalid replace_stride_with_dilation: {0} entries (must be 3)")]
    InvalidDilationLength(usize),

    #[error("Invalid stage width: stage {stage} has width 0")]
    ZeroBaseWidth { stage: usize },

    #[error(
        "Student {student} gets zero width in stage {stage} (base width {base} split over {num_students} students)"
    )]
    ZeroStageWidth {
        student: usize,
        stage: usize,
        base: usize,
        num_students: usize,
    },

    #[error("Student {student} stage {stage}: bottleneck with {planes} planes has zero inner width")]
    ZeroInnerWidth {
        student: usize,
        stage: usize,
        planes: usize,
    },

    #[error("Invalid temperature: {0} (must be > 0.0)")]
    InvalidTemperature(f32),

    #[error("Invalid contribution ratios: {0}")]
    InvalidContributionRatios(String),
}

/// Validated network configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleConfig {
    backbone: Backbone,
    num_classes: usize,
    shrinking_stages: usize,
    schedule: ChannelSchedule,
    dilation: [bool; 3],
    freeze_base: bool,
    zero_init_residual: bool,
    aggregation: Aggregation,
    pretrained: Option<PathBuf>,
    seed: u64,
}

impl EnsembleConfig {
    pub fn backbone(&self) -> Backbone {
        self.backbone
    }

    pub fn spec(&self) -> BackboneSpec {
        self.backbone.spec()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_students(&self) -> usize {
        self.schedule.num_students()
    }

    pub fn shrinking_stages(&self) -> usize {
        self.shrinking_stages
    }

    pub fn schedule(&self) -> &ChannelSchedule {
        &self.schedule
    }

    pub fn dilation(&self) -> [bool; 3] {
        self.dilation
    }

    pub fn freeze_base(&self) -> bool {
        self.freeze_base
    }

    pub fn zero_init_residual(&self) -> bool {
        self.zero_init_residual
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn pretrained(&self) -> Option<&Path> {
        self.pretrained.as_deref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl ModelSpec {
    /// Spec with default options for `backbone`
    pub fn new(backbone: Backbone, num_classes: usize) -> Self {
        Self {
            backbone,
            num_classes,
            num_students: 4,
            shrinking_stages: 3,
            stage_widths: crate::resnet::DEFAULT_STAGE_WIDTHS,
            replace_stride_with_dilation: vec![false; 3],
            freeze_base: false,
            zero_init_residual: false,
            aggregation: Aggregation::Sum,
            pretrained: None,
            seed: 0,
        }
    }

    pub fn validate(&self) -> Result<EnsembleConfig, ValidationError> {
        if self.num_classes == 0 {
            return Err(ValidationError::InvalidNumClasses(self.num_classes));
        }

        let dilation: [bool; 3] = self
            .replace_stride_with_dilation
            .as_slice()
            .try_into()
            .map_err(|_| {
                ValidationError::InvalidDilationLength(self.replace_stride_with_dilation.len())
            })?;

        let schedule =
            ChannelSchedule::compute(self.num_students, self.shrinking_stages, self.stage_widths)?;

        let spec = self.backbone.spec();
        if spec.block == BlockKind::Bottleneck {
            for (student, widths) in schedule.iter().enumerate() {
                for (stage, &planes) in widths.iter().enumerate() {
                    if Bottleneck::inner_width(planes, spec.width_per_group, spec.groups) == 0 {
                        return Err(ValidationError::ZeroInnerWidth {
                            student,
                            stage,
                            planes,
                        });
                    }
                }
            }
        }

        Ok(EnsembleConfig {
            backbone: self.backbone,
            num_classes: self.num_classes,
            shrinking_stages: self.shrinking_stages,
            schedule,
            dilation,
            freeze_base: self.freeze_base,
            zero_init_residual: self.zero_init_residual,
            aggregation: self.aggregation,
            pretrained: self.pretrained.clone(),
            seed: self.seed,
        })
    }
}

impl TryFrom<ModelSpec> for EnsembleConfig {
    type Error = ValidationError;

    fn try_from(spec: ModelSpec) -> Result<Self, Self::Error> {
        spec.validate()
    }
}

/// Validated loss weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossConfig {
    pub teacher_weight: f32,
    pub intermediate_weight: f32,
    pub student_kl_weight: f32,
    pub temperature: f32,
    pub adaptation: bool,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            teacher_weight: 1.0,
            intermediate_weight: 1.0,
            student_kl_weight: 1.0,
            temperature: 3.0,
            adaptation: true,
        }
    }
}

impl LossSpec {
    pub fn validate(&self) -> Result<LossConfig, ValidationError> {
        let [teacher_weight, intermediate_weight, student_kl_weight]: [f32; 3] = self
            .contribution_ratios
            .as_slice()
            .try_into()
            .map_err(|_| {
                ValidationError::InvalidContributionRatios(format!(
                    "expected 3 entries, got {}",
                    self.contribution_ratios.len()
                ))
            })?;
        for ratio in [teacher_weight, intermediate_weight, student_kl_weight] {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(ValidationError::InvalidContributionRatios(format!(
                    "{ratio} is not a finite non-negative weight"
                )));
            }
        }

        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ValidationError::InvalidTemperature(self.temperature));
        }

        Ok(LossConfig {
            teacher_weight,
            intermediate_weight,
            student_kl_weight,
            temperature: self.temperature,
            adaptation: self.adaptation,
        })
    }
}

/// Validated experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfig {
    pub model: EnsembleConfig,
    pub loss: LossConfig,
}

impl ExperimentSpec {
    pub fn validate(&self) -> Result<ExperimentConfig, ValidationError> {
        Ok(ExperimentConfig {
            model: self.model.validate()?,
            loss: self.loss.validate()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_spec() -> ModelSpec {
        ModelSpec::new(Backbone::ResNet18, 10)
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_spec().validate().unwrap();
        assert_eq!(config.num_students(), 4);
        assert_eq!(config.num_classes(), 10);
        assert_eq!(config.dilation(), [false; 3]);
        assert_eq!(config.aggregation(), Aggregation::Sum);
        assert!(config.pretrained().is_none());
    }

    #[test]
    fn test_invalid_num_classes() {
        let mut spec = create_valid_spec();
        spec.num_classes = 0;
        assert_eq!(
            spec.validate().unwrap_err(),
            ValidationError::InvalidNumClasses(0)
        );
    }

    #[test]
    fn test_invalid_students() {
        let mut spec = create_valid_spec();
        spec.num_students = 0;
        assert_eq!(spec.validate().unwrap_err(), ValidationError::NoStudents);
    }

    #[test]
    fn test_invalid_shrinking_stages() {
        let mut spec = create_valid_spec();
        spec.shrinking_stages = 4;
        assert_eq!(
            spec.validate().unwrap_err(),
            ValidationError::InvalidShrinkingStages(4)
        );
    }

    #[test]
    fn test_invalid_dilation_length() {
        let mut spec = create_valid_spec();
        spec.replace_stride_with_dilation = vec![false, true];
        assert_eq!(
            spec.validate().unwrap_err(),
            ValidationError::InvalidDilationLength(2)
        );
    }

    #[test]
    fn test_zero_width_is_fatal() {
        let mut spec = create_valid_spec();
        spec.stage_widths = [4, 8, 16];
        spec.num_students = 5;
        assert!(matches!(
            spec.validate().unwrap_err(),
            ValidationError::ZeroStageWidth { student: 4, stage: 0, base: 4, num_students: 5 }
        ));
    }

    #[test]
    fn test_zero_bottleneck_width_is_fatal() {
        let mut spec = ModelSpec::new(Backbone::ResNeXt50_32x4d, 10);
        spec.stage_widths = [8, 16, 32];
        spec.num_students = 1;
        assert!(matches!(
            spec.validate().unwrap_err(),
            ValidationError::ZeroInnerWidth { student: 0, stage: 0, planes: 8 }
        ));
    }

    #[test]
    fn test_try_from() {
        let config = EnsembleConfig::try_from(create_valid_spec()).unwrap();
        assert_eq!(config.backbone(), Backbone::ResNet18);
    }

    #[test]
    fn test_loss_defaults() {
        let config = LossSpec::default().validate().unwrap();
        assert_eq!(config, LossConfig::default());
    }

    #[test]
    fn test_invalid_ratios() {
        let spec = LossSpec {
            contribution_ratios: vec![1.0, 1.0],
            ..LossSpec::default()
        };
        assert!(matches!(
            spec.validate().unwrap_err(),
            ValidationError::InvalidContributionRatios(_)
        ));

        let spec = LossSpec {
            contribution_ratios: vec![1.0, -0.5, 1.0],
            ..LossSpec::default()
        };
        assert!(matches!(
            spec.validate().unwrap_err(),
            ValidationError::InvalidContributionRatios(_)
        ));
    }

    #[test]
    fn test_invalid_temperature() {
        for temperature in [0.0, -1.0, f32::NAN] {
            let spec = LossSpec {
                temperature,
                ..LossSpec::default()
            };
            assert!(matches!(
                spec.validate().unwrap_err(),
                ValidationError::InvalidTemperature(_)
            ));
        }
    }
}

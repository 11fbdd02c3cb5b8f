//! Loss composition for jointly trained students

use super::adaptation::AdaptationLayers;
use super::loss::{cross_entropy, feature_mse, soft_target_kl};
use crate::config::LossConfig;
use crate::ensemble::EnsembleOutput;
use crate::nn::{child, Module, StateKind};
use crate::{Result, Tensor};
use rand::Rng;
use serde::Serialize;

/// Individual terms of the distillation objective
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossBreakdown {
    /// Cross-entropy of the teacher logits against the labels
    pub teacher_ce: f32,
    /// Summed feature MSE of every student against student 0
    pub intermediate: f32,
    /// Summed soft-target KL of every student against the teacher
    pub student_kl: f32,
    /// Weighted combination of the three terms
    pub total: f32,
    /// Feature pairs left out because widths differ and adaptation is off
    pub skipped_pairs: usize,
}

/// Teacher cross-entropy + intermediate MSE + student KL
///
/// ```text
/// total = w_t · CE(teacher, y)
///       + w_i · Σ_k Σ_{j≥1} MSE(adapt(f_kj), f_k0)
///       + w_s · Σ_j T² · KL(softmax(teacher/T) ‖ softmax(student_j/T))
/// ```
pub struct MultiStudentObjective {
    config: LossConfig,
    adaptation: Option<AdaptationLayers>,
}

impl MultiStudentObjective {
    /// `feature_channels[j]` holds the stage output channels of student `j`
    pub fn new<R: Rng>(
        config: LossConfig,
        feature_channels: &[[usize; 3]],
        rng: &mut R,
    ) -> Result<Self> {
        let adaptation = if config.adaptation {
            Some(AdaptationLayers::new(feature_channels, rng)?)
        } else {
            None
        };
        Ok(Self { config, adaptation })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    pub fn adaptation(&self) -> Option<&AdaptationLayers> {
        self.adaptation.as_ref()
    }

    pub fn compute(&self, output: &EnsembleOutput, labels: &[usize]) -> Result<LossBreakdown> {
        let teacher_ce = cross_entropy(output.teacher(), labels)?;

        let mut student_kl = 0.0;
        for student in output.students() {
            student_kl += soft_target_kl(student, output.teacher(), self.config.temperature)?;
        }

        let (intermediate, skipped_pairs) = self.intermediate_loss(output)?;

        let total = self.config.teacher_weight * teacher_ce
            + self.config.intermediate_weight * intermediate
            + self.config.student_kl_weight * student_kl;

        Ok(LossBreakdown {
            teacher_ce,
            intermediate,
            student_kl,
            total,
            skipped_pairs,
        })
    }

    fn intermediate_loss(&self, output: &EnsembleOutput) -> Result<(f32, usize)> {
        let mut loss = 0.0;
        let mut skipped = 0;

        for (k, stage) in output.intermediates().iter().enumerate() {
            let Some((reference, rest)) = stage.split_first() else {
                continue;
            };
            for (i, feature) in rest.iter().enumerate() {
                let j = i + 1;
                if feature.dim() == reference.dim() {
                    loss += feature_mse(feature, reference)?;
                    continue;
                }
                match self.adaptation.as_ref().and_then(|a| a.project(k, j, feature)) {
                    Some(projected) => loss += feature_mse(&projected?, reference)?,
                    None => {
                        tracing::debug!(stage = k, student = j, "skipping feature pair with mismatched width");
                        skipped += 1;
                    }
                }
            }
        }
        Ok((loss, skipped))
    }
}

impl Module for MultiStudentObjective {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &Tensor)) {
        if let Some(adaptation) = &self.adaptation {
            adaptation.visit(&child(prefix, "adaptation"), f);
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(&str, StateKind, &mut Tensor)) {
        if let Some(adaptation) = &mut self.adaptation {
            adaptation.visit_mut(&child(prefix, "adaptation"), f);
        }
    }
}

//! Tests for the multi-student objective

use super::*;
use crate::config::LossConfig;
use crate::ensemble::{sum_logits, EnsembleOutput};
use crate::nn::Module;
use crate::resnet::StudentOutput;
use approx::assert_relative_eq;
use ndarray::{array, Array2, Array4};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn student(logits: Array2<f32>, widths: [usize; 3], fill: f32) -> StudentOutput {
    StudentOutput {
        logits,
        features: [
            Array4::from_elem((2, widths[0], 4, 4), fill),
            Array4::from_elem((2, widths[1], 2, 2), fill),
            Array4::from_elem((2, widths[2], 1, 1), fill),
        ],
    }
}

fn output(students: Vec<StudentOutput>) -> EnsembleOutput {
    let teacher = sum_logits(students.iter().map(|s| (1.0, &s.logits))).unwrap();
    EnsembleOutput::new(teacher, students)
}

fn objective(config: LossConfig, channels: &[[usize; 3]]) -> MultiStudentObjective {
    let mut rng = StdRng::seed_from_u64(0);
    MultiStudentObjective::new(config, channels, &mut rng).unwrap()
}

#[test]
fn test_equal_width_features_compare_directly() {
    let out = output(vec![
        student(array![[1.0, 0.0], [0.0, 1.0]], [4, 4, 4], 0.0),
        student(array![[0.5, 0.5], [0.2, 0.1]], [4, 4, 4], 1.0),
    ]);
    let obj = objective(LossConfig::default(), &[[4, 4, 4], [4, 4, 4]]);
    let loss = obj.compute(&out, &[0, 1]).unwrap();

    // three stages, each MSE = 1
    assert_relative_eq!(loss.intermediate, 3.0, epsilon = 1e-6);
    assert_eq!(loss.skipped_pairs, 0);
    assert!(obj.adaptation().unwrap().is_empty());
}

#[test]
fn test_total_is_weighted_sum() {
    let out = output(vec![
        student(array![[2.0, 0.0], [0.0, 1.0]], [4, 4, 4], 0.0),
        student(array![[0.5, 0.5], [0.2, 0.9]], [4, 4, 4], 0.5),
    ]);
    let config = LossConfig {
        teacher_weight: 0.5,
        intermediate_weight: 2.0,
        student_kl_weight: 3.0,
        ..LossConfig::default()
    };
    let loss = objective(config, &[[4, 4, 4], [4, 4, 4]])
        .compute(&out, &[0, 1])
        .unwrap();

    let expected = 0.5 * loss.teacher_ce + 2.0 * loss.intermediate + 3.0 * loss.student_kl;
    assert_relative_eq!(loss.total, expected, epsilon = 1e-5);
    assert_relative_eq!(
        loss.teacher_ce,
        cross_entropy(out.teacher(), &[0, 1]).unwrap(),
        epsilon = 1e-6
    );
}

#[test]
fn test_student_kl_sums_over_students() {
    let out = output(vec![
        student(array![[2.0, 0.0], [0.0, 1.0]], [4, 4, 4], 0.0),
        student(array![[0.5, 0.5], [0.2, 0.9]], [4, 4, 4], 0.0),
    ]);
    let loss = objective(LossConfig::default(), &[[4, 4, 4], [4, 4, 4]])
        .compute(&out, &[0, 1])
        .unwrap();

    let expected: f32 = out
        .students()
        .iter()
        .map(|s| soft_target_kl(s, out.teacher(), 3.0).unwrap())
        .sum();
    assert_relative_eq!(loss.student_kl, expected, epsilon = 1e-6);
}

#[test]
fn test_mismatched_widths_are_projected() {
    let channels = [[4, 8, 8], [2, 4, 8]];
    let out = output(vec![
        student(Array2::zeros((2, 3)), channels[0], 0.0),
        student(Array2::zeros((2, 3)), channels[1], 1.0),
    ]);
    let obj = objective(LossConfig::default(), &channels);
    let loss = obj.compute(&out, &[0, 2]).unwrap();

    assert_eq!(loss.skipped_pairs, 0);
    assert_eq!(obj.adaptation().unwrap().len(), 2);
    assert!(loss.intermediate >= 1.0);
    assert_eq!(
        obj.parameter_names(),
        vec!["adaptation.0.1.weight", "adaptation.1.1.weight"]
    );
}

#[test]
fn test_mismatched_widths_skipped_without_adaptation() {
    let channels = [[4, 8, 8], [2, 4, 8]];
    let out = output(vec![
        student(Array2::zeros((2, 3)), channels[0], 0.0),
        student(Array2::zeros((2, 3)), channels[1], 1.0),
    ]);
    let config = LossConfig {
        adaptation: false,
        ..LossConfig::default()
    };
    let obj = objective(config, &channels);
    let loss = obj.compute(&out, &[0, 2]).unwrap();

    assert_eq!(loss.skipped_pairs, 2);
    assert_relative_eq!(loss.intermediate, 1.0, epsilon = 1e-6);
    assert!(obj.adaptation().is_none());
    assert_eq!(obj.num_parameters(), 0);
}

#[test]
fn test_single_student_has_no_intermediate_term() {
    let out = output(vec![student(array![[1.0, 2.0], [0.0, 0.0]], [4, 4, 4], 3.0)]);
    let loss = objective(LossConfig::default(), &[[4, 4, 4]])
        .compute(&out, &[1, 0])
        .unwrap();
    assert_eq!(loss.intermediate, 0.0);
    // teacher equals the only student
    assert_relative_eq!(loss.student_kl, 0.0, epsilon = 1e-6);
}

#[test]
fn test_breakdown_serializes() {
    let breakdown = LossBreakdown {
        teacher_ce: 1.0,
        intermediate: 0.5,
        student_kl: 0.25,
        total: 1.75,
        skipped_pairs: 0,
    };
    let json = serde_json::to_value(breakdown).unwrap();
    assert_eq!(json["total"], 1.75);
    assert_eq!(json["skipped_pairs"], 0);
}

#[test]
fn test_label_errors_propagate() {
    let out = output(vec![student(Array2::zeros((2, 3)), [4, 4, 4], 0.0)]);
    let obj = objective(LossConfig::default(), &[[4, 4, 4]]);
    assert!(obj.compute(&out, &[0]).is_err());
    assert!(obj.compute(&out, &[0, 3]).is_err());
}

proptest! {
    #[test]
    fn prop_loss_terms_non_negative(
        a in prop::collection::vec(-5.0f32..5.0, 6),
        b in prop::collection::vec(-5.0f32..5.0, 6),
        labels in prop::collection::vec(0usize..3, 2),
        temperature in 0.5f32..8.0,
    ) {
        let la = Array2::from_shape_vec((2, 3), a).unwrap();
        let lb = Array2::from_shape_vec((2, 3), b).unwrap();
        let out = output(vec![
            student(la, [4, 4, 4], 0.0),
            student(lb, [4, 4, 4], 0.5),
        ]);
        let config = LossConfig { temperature, ..LossConfig::default() };
        let loss = objective(config, &[[4, 4, 4], [4, 4, 4]]).compute(&out, &labels).unwrap();

        prop_assert!(loss.teacher_ce >= -1e-6);
        prop_assert!(loss.student_kl >= -1e-4);
        prop_assert!(loss.intermediate >= 0.0);
        prop_assert!(loss.total.is_finite());
    }

    #[test]
    fn prop_kl_zero_for_identical_logits(
        logits in prop::collection::vec(-10.0f32..10.0, 4),
        temperature in 0.5f32..8.0,
    ) {
        let l = Array2::from_shape_vec((1, 4), logits).unwrap();
        let kl = soft_target_kl(&l, &l, temperature).unwrap();
        prop_assert!(kl.abs() < 1e-5);
    }
}

//! End-to-end tests: YAML experiment to forward pass to loss breakdown

use approx::assert_abs_diff_eq;
use ndarray::{Array, Array4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use renacido::config::parse_config;
use renacido::distill::MultiStudentObjective;
use renacido::ensemble::MultiStudentNet;
use renacido::nn::Module;
use renacido::Context;

const EXPERIMENT: &str = r#"
model:
  backbone: resnet18
  num_classes: 6
  num_students: 3
  stage_widths: [8, 16, 32]
  seed: 11
loss:
  contribution_ratios: [1.0, 0.5, 1.0]
  temperature: 2.0
"#;

fn images(n: usize, size: usize) -> Array4<f32> {
    Array::from_shape_fn((n, 3, size, size), |(b, c, i, j)| {
        ((b + 2 * c + 3 * i + 5 * j) % 13) as f32 / 13.0 - 0.5
    })
}

#[test]
fn test_pipeline_from_yaml() {
    let config = parse_config(EXPERIMENT).unwrap();
    let mut net = MultiStudentNet::new(config.model.clone()).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let objective =
        MultiStudentObjective::new(config.loss, &net.feature_channels(), &mut rng).unwrap();

    let output = net.forward(&images(2, 32), &Context::new()).unwrap();
    assert_eq!(output.logits().len(), 4);
    assert_eq!(output.teacher().dim(), (2, 6));

    let loss = objective.compute(&output, &[0, 5]).unwrap();
    assert!(loss.total.is_finite());
    assert_eq!(loss.skipped_pairs, 0);
    assert_abs_diff_eq!(
        loss.total,
        loss.teacher_ce + 0.5 * loss.intermediate + loss.student_kl,
        epsilon = 1e-4
    );
}

#[test]
fn test_teacher_is_sum_of_students() {
    let config = parse_config(EXPERIMENT).unwrap();
    let mut net = MultiStudentNet::new(config.model).unwrap();
    let output = net.forward(&images(3, 32), &Context::evaluation()).unwrap();

    let mut expected = output.students()[0].clone();
    for logits in &output.students()[1..] {
        expected += logits;
    }
    for (t, e) in output.teacher().iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*t, *e, epsilon = 1e-5);
    }
}

#[test]
fn test_students_shrink_in_order() {
    let config = parse_config(EXPERIMENT).unwrap();
    let mut net = MultiStudentNet::new(config.model).unwrap();
    assert_eq!(
        net.feature_channels(),
        vec![[8, 16, 32], [5, 10, 21], [2, 5, 10]]
    );

    let output = net.forward(&images(1, 32), &Context::evaluation()).unwrap();
    for (k, stage) in output.intermediates().iter().enumerate() {
        let widths: Vec<usize> = stage.iter().map(|f| f.dim().1).collect();
        assert_eq!(widths, net.schedule().iter().map(|w| w[k]).collect::<Vec<_>>());
    }
}

#[test]
fn test_same_seed_same_network() {
    let config = parse_config(EXPERIMENT).unwrap();
    let a = MultiStudentNet::new(config.model.clone()).unwrap();
    let b = MultiStudentNet::new(config.model).unwrap();
    assert_eq!(a.state_dict(), b.state_dict());
}

#[test]
fn test_frozen_base_from_yaml() {
    let yaml = EXPERIMENT.replace("seed: 11", "seed: 11\n  freeze_base: true");
    let config = parse_config(&yaml).unwrap();
    let net = MultiStudentNet::new(config.model).unwrap();

    assert!(net.is_base_frozen());
    assert_eq!(
        net.num_trainable_parameters(),
        net.num_parameters() - net.base().num_parameters() - net.num_students()
    );
    assert!(!net.contribution_weights().requires_grad());
}

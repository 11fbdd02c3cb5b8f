//! Distillation loss functions

use crate::{Error, Result};
use ndarray::{Array2, Array4, Axis};

/// Softmax along the class axis
///
/// softmax(x)_i = exp(x_i) / Σ exp(x_j)
pub fn softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        // Subtract max for numerical stability
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());

        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

/// Mean cross-entropy of `logits` against hard class labels
pub fn cross_entropy(logits: &Array2<f32>, labels: &[usize]) -> Result<f32> {
    let (batch, classes) = logits.dim();
    if batch != labels.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![batch],
            got: vec![labels.len()],
        });
    }
    if batch == 0 {
        return Err(Error::InvalidParameter("empty batch".to_string()));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        return Err(Error::InvalidParameter(format!(
            "label {bad} out of range for {classes} classes"
        )));
    }

    let probs = softmax_2d(logits);
    let loss: f32 = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| -probs[[i, label]].max(1e-10).ln())
        .sum();
    Ok(loss / batch as f32)
}

/// KL(p || q) between row distributions, averaged over the batch
pub fn kl_divergence(p: &Array2<f32>, q: &Array2<f32>) -> Result<f32> {
    if p.dim() != q.dim() {
        return Err(Error::ShapeMismatch {
            expected: p.shape().to_vec(),
            got: q.shape().to_vec(),
        });
    }
    if p.nrows() == 0 {
        return Err(Error::InvalidParameter("empty batch".to_string()));
    }

    let total: f32 = p
        .iter()
        .zip(q.iter())
        .filter(|(p_i, _)| **p_i > 1e-10)
        .map(|(&p_i, &q_i)| p_i * (p_i / q_i.max(1e-10)).ln())
        .sum();
    Ok(total / p.nrows() as f32)
}

/// Temperature-softened KL from teacher to student, scaled by T²
///
/// ```text
/// T² · KL(softmax(teacher / T) ‖ softmax(student / T))
/// ```
pub fn soft_target_kl(
    student_logits: &Array2<f32>,
    teacher_logits: &Array2<f32>,
    temperature: f32,
) -> Result<f32> {
    if temperature.is_nan() || temperature <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "temperature must be positive, got {temperature}"
        )));
    }
    let student_soft = softmax_2d(&(student_logits / temperature));
    let teacher_soft = softmax_2d(&(teacher_logits / temperature));
    Ok(kl_divergence(&teacher_soft, &student_soft)? * temperature * temperature)
}

/// Mean squared error between two feature maps of identical shape
pub fn feature_mse(a: &Array4<f32>, b: &Array4<f32>) -> Result<f32> {
    if a.dim() != b.dim() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    if a.is_empty() {
        return Err(Error::InvalidParameter("empty feature map".to_string()));
    }
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sum / a.len() as f32)
}

//! Ensemble forward-pass results

use crate::resnet::StudentOutput;
use crate::{Error, Result};
use ndarray::{Array2, Array4};

/// Logits of the synthesized teacher and every student, plus intermediate
/// features grouped by stage
#[derive(Debug, Clone)]
pub struct EnsembleOutput {
    /// `[teacher, student_0, ..., student_{N-1}]`
    logits: Vec<Array2<f32>>,
    /// `intermediates[k][j]` is stage `k` of student `j`
    intermediates: [Vec<Array4<f32>>; 3],
}

impl EnsembleOutput {
    /// Assemble an output from a teacher signal and per-student results
    pub fn new(teacher: Array2<f32>, students: Vec<StudentOutput>) -> Self {
        let (student_logits, features): (Vec<_>, Vec<_>) = students
            .into_iter()
            .map(|out| (out.logits, out.features))
            .unzip();
        Self {
            logits: std::iter::once(teacher).chain(student_logits).collect(),
            intermediates: group_by_stage(features),
        }
    }

    /// Teacher logits, always at index 0 of [`Self::logits`]
    pub fn teacher(&self) -> &Array2<f32> {
        &self.logits[0]
    }

    /// Student logits in rank order
    pub fn students(&self) -> &[Array2<f32>] {
        &self.logits[1..]
    }

    pub fn num_students(&self) -> usize {
        self.logits.len() - 1
    }

    /// Teacher followed by every student
    pub fn logits(&self) -> &[Array2<f32>] {
        &self.logits
    }

    /// Features of stage `k` (0 = layer2) for every student
    pub fn stage(&self, k: usize) -> Option<&[Array4<f32>]> {
        self.intermediates.get(k).map(Vec::as_slice)
    }

    pub fn intermediates(&self) -> &[Vec<Array4<f32>>; 3] {
        &self.intermediates
    }

    pub fn into_parts(self) -> (Vec<Array2<f32>>, [Vec<Array4<f32>>; 3]) {
        (self.logits, self.intermediates)
    }
}

/// Weighted elementwise sum of student logits
///
/// With unit weights this is the raw sum; no averaging takes place.
pub fn sum_logits<'a, I>(weighted: I) -> Result<Array2<f32>>
where
    I: IntoIterator<Item = (f32, &'a Array2<f32>)>,
{
    let mut iter = weighted.into_iter().peekable();
    let dim = iter
        .peek()
        .map(|(_, logits)| logits.dim())
        .ok_or_else(|| Error::InvalidParameter("no student logits to aggregate".to_string()))?;

    iter.try_fold(Array2::zeros(dim), |mut acc, (weight, logits)| {
        if logits.dim() != dim {
            return Err(Error::ShapeMismatch {
                expected: vec![dim.0, dim.1],
                got: logits.shape().to_vec(),
            });
        }
        acc.scaled_add(weight, logits);
        Ok(acc)
    })
}

/// Transpose per-student `[layer2, layer3, layer4]` features into per-stage
/// lists ordered by student rank
pub fn group_by_stage<I>(features: I) -> [Vec<Array4<f32>>; 3]
where
    I: IntoIterator<Item = [Array4<f32>; 3]>,
{
    features
        .into_iter()
        .fold(Default::default(), |mut groups, stages| {
            for (group, feature) in groups.iter_mut().zip(stages) {
                group.push(feature);
            }
            groups
        })
}

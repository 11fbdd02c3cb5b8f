//! Per-student channel widths

use crate::config::ValidationError;
use serde::Serialize;

/// Widths of the three student stages before block expansion
pub const DEFAULT_STAGE_WIDTHS: [usize; 3] = [128, 256, 512];

/// Stage widths for every student, widest first
///
/// Student `j` of `N` scales each of the last `shrinking_stages` widths by
/// `(N - j) / N` (truncating); earlier stages keep the full width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSchedule {
    widths: Vec<[usize; 3]>,
}

impl ChannelSchedule {
    pub fn compute(
        num_students: usize,
        shrinking_stages: usize,
        base: [usize; 3],
    ) -> Result<Self, ValidationError> {
        if num_students == 0 {
            return Err(ValidationError::NoStudents);
        }
        if !(1..=3).contains(&shrinking_stages) {
            return Err(ValidationError::InvalidShrinkingStages(shrinking_stages));
        }
        if let Some(stage) = base.iter().position(|&w| w == 0) {
            return Err(ValidationError::ZeroBaseWidth { stage });
        }

        let first_shrunk = 3 - shrinking_stages;
        let widths: Vec<[usize; 3]> = (0..num_students)
            .map(|j| {
                let mut row = base;
                for w in row.iter_mut().skip(first_shrunk) {
                    *w = *w * (num_students - j) / num_students;
                }
                row
            })
            .collect();

        for (student, row) in widths.iter().enumerate() {
            if let Some(stage) = row.iter().position(|&w| w == 0) {
                return Err(ValidationError::ZeroStageWidth {
                    student,
                    stage,
                    base: base[stage],
                    num_students,
                });
            }
        }

        Ok(Self { widths })
    }

    pub fn num_students(&self) -> usize {
        self.widths.len()
    }

    /// Widths for student `j`
    pub fn student(&self, j: usize) -> Option<[usize; 3]> {
        self.widths.get(j).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.widths.iter().copied()
    }

    pub fn as_slice(&self) -> &[[usize; 3]] {
        &self.widths
    }
}

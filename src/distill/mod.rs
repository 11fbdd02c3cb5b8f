//! Knowledge distillation between jointly trained students
//!
//! The synthesized teacher (sum of student logits) is trained on hard labels,
//! every student is pulled towards the softened teacher distribution, and the
//! intermediate features of narrower students are matched against the widest
//! student.
//!
//! ## Example
//!
//! ```
//! use renacido::distill::soft_target_kl;
//! use ndarray::array;
//!
//! let student_logits = array![[1.0, 2.0, 1.5]];
//! let teacher_logits = array![[1.2, 1.8, 1.6]];
//! let loss = soft_target_kl(&student_logits, &teacher_logits, 3.0)?;
//! assert!(loss > 0.0);
//! # Ok::<(), renacido::Error>(())
//! ```

mod adaptation;
mod loss;
mod objective;

#[cfg(test)]
mod tests;

pub use adaptation::AdaptationLayers;
pub use loss::{cross_entropy, feature_mse, kl_divergence, soft_target_kl, softmax_2d};
pub use objective::{LossBreakdown, MultiStudentObjective};

//! Multi-student ensemble
//!
//! A single forward pass runs the shared base once, runs every student on the
//! same base output and synthesizes the teacher signal from the student
//! logits.
//!
//! ```no_run
//! use renacido::config::ModelSpec;
//! use renacido::ensemble::MultiStudentNet;
//! use renacido::resnet::Backbone;
//! use renacido::Context;
//! use ndarray::Array4;
//!
//! let config = ModelSpec::new(Backbone::ResNet18, 10).validate()?;
//! let mut net = MultiStudentNet::new(config)?;
//! let out = net.forward(&Array4::zeros((2, 3, 32, 32)), &Context::evaluation())?;
//! assert_eq!(out.logits().len(), 5);
//! # Ok::<(), renacido::Error>(())
//! ```

mod net;
mod output;


pub use crate::config::Aggregation;
pub use net::MultiStudentNet;
pub use output::{group_by_stage, sum_logits, EnsembleOutput};

//! Declarative YAML experiment configuration
//!
//! # Example
//!
//! ```yaml
//! model:
//!   backbone: wide_resnet50_2
//!   num_classes: 10
//!   num_students: 5
//!   shrinking_stages: 3
//!   freeze_base: false
//!
//! loss:
//!   contribution_ratios: [1.0, 1.0, 1.0]
//!   temperature: 3.0
//!   adaptation: true
//! ```

mod cli;
mod load;
mod schema;
mod validate;



pub use cli::{
    apply_overrides, parse_args, Cli, Command, ForwardArgs, InfoArgs, OutputFormat, ValidateArgs,
};
pub use load::{load_config, parse_config, read_spec};
pub use schema::{Aggregation, ExperimentSpec, LossSpec, ModelSpec};
pub use validate::{EnsembleConfig, ExperimentConfig, LossConfig, ValidationError};

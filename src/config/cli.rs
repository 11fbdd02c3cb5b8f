//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! renacido validate experiment.yaml
//! renacido info experiment.yaml --format json
//! renacido forward experiment.yaml --batch-size 4 --image-size 64 --train
//! ```

use super::schema::ModelSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Renacido: multi-student self-distillation over residual networks
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "renacido")]
#[command(version)]
#[command(about = "Multi-student self-distillation over residual network backbones")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate an experiment file
    Validate(ValidateArgs),

    /// Show the channel schedule and parameter counts
    Info(InfoArgs),

    /// Run one random batch through the ensemble and the loss
    Forward(ForwardArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the forward command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ForwardArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Images in the random batch
    #[arg(short, long, default_value = "2")]
    pub batch_size: usize,

    /// Height and width of the random images
    #[arg(short, long, default_value = "32")]
    pub image_size: usize,

    /// Use batch statistics instead of running statistics
    #[arg(long)]
    pub train: bool,

    /// Override the initialization seed
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Output format for the info command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Unknown output format: {s}. Valid formats: text, json"
            )),
        }
    }
}

/// Parse command-line arguments
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a model spec
pub fn apply_overrides(spec: &mut ModelSpec, args: &ForwardArgs) {
    if let Some(seed) = args.seed {
        spec.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resnet::Backbone;

    #[test]
    fn test_parse_validate_command() {
        let cli = parse_args(["renacido", "validate", "exp.yaml"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Validate(ValidateArgs {
                config: PathBuf::from("exp.yaml")
            })
        );
        assert!(!cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_info_format() {
        let cli = parse_args(["renacido", "info", "exp.yaml", "--format", "json"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Json),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = parse_args(["renacido", "info", "exp.yaml"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Text),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(parse_args(["renacido", "info", "exp.yaml", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_parse_forward_defaults_and_options() {
        let cli = parse_args(["renacido", "forward", "exp.yaml"]).unwrap();
        match cli.command {
            Command::Forward(args) => {
                assert_eq!(args.batch_size, 2);
                assert_eq!(args.image_size, 32);
                assert!(!args.train);
                assert_eq!(args.seed, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = parse_args([
            "renacido",
            "forward",
            "exp.yaml",
            "--batch-size",
            "4",
            "--image-size",
            "64",
            "--train",
            "--seed",
            "7",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Forward(args) => {
                assert_eq!(args.batch_size, 4);
                assert_eq!(args.image_size, 64);
                assert!(args.train);
                assert_eq!(args.seed, Some(7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_missing_config_is_error() {
        assert!(parse_args(["renacido", "validate"]).is_err());
    }

    #[test]
    fn test_apply_seed_override() {
        let mut spec = ModelSpec::new(Backbone::ResNet18, 10);
        let args = ForwardArgs {
            config: PathBuf::from("exp.yaml"),
            batch_size: 2,
            image_size: 32,
            train: false,
            seed: Some(42),
        };
        apply_overrides(&mut spec, &args);
        assert_eq!(spec.seed, 42);

        let args = ForwardArgs { seed: None, ..args };
        apply_overrides(&mut spec, &args);
        assert_eq!(spec.seed, 42);
    }
}

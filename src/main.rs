//! Renacido CLI
//!
//! # Usage
//!
//! ```bash
//! # Validate an experiment file
//! renacido validate experiment.yaml
//!
//! # Show the channel schedule and parameter counts
//! renacido info experiment.yaml --format json
//!
//! # Push one random batch through the ensemble and the objective
//! renacido forward experiment.yaml --batch-size 4 --image-size 64 --train
//! ```

use clap::Parser;
use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use renacido::config::{
    apply_overrides, load_config, read_spec, Cli, Command, ExperimentConfig, ForwardArgs, InfoArgs,
    OutputFormat, ValidateArgs,
};
use renacido::distill::MultiStudentObjective;
use renacido::ensemble::MultiStudentNet;
use renacido::nn::Module;
use renacido::resnet::INPUT_CHANNELS;
use renacido::{Context, Error, Result};
use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
        Command::Forward(args) => run_forward(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    println!(
        "✓ {} is valid: {} with {} students",
        args.config.display(),
        config.model.backbone(),
        config.model.num_students()
    );
    Ok(())
}

#[derive(Serialize)]
struct ParameterCounts {
    base: usize,
    students: Vec<usize>,
    total: usize,
    trainable: usize,
}

#[derive(Serialize)]
struct Info<'a> {
    #[serde(flatten)]
    config: &'a ExperimentConfig,
    parameters: ParameterCounts,
}

fn run_info(args: InfoArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let net = MultiStudentNet::new(config.model.clone())?;
    let parameters = ParameterCounts {
        base: net.base().num_parameters(),
        students: net.students().iter().map(|s| s.num_parameters()).collect(),
        total: net.num_parameters(),
        trainable: net.num_trainable_parameters(),
    };

    match args.format {
        OutputFormat::Text => {
            let model = &config.model;
            println!("Backbone: {}", model.backbone());
            println!("Classes: {}", model.num_classes());
            println!(
                "Students: {} ({} shrinking stages)",
                model.num_students(),
                model.shrinking_stages()
            );
            for (j, (widths, count)) in model
                .schedule()
                .iter()
                .zip(&parameters.students)
                .enumerate()
            {
                println!("  student {j}: widths {widths:?}, {count} parameters");
            }
            println!("Base parameters: {}", parameters.base);
            println!(
                "Total parameters: {} ({} trainable)",
                parameters.total, parameters.trainable
            );
            println!("Base frozen: {}", net.is_base_frozen());
            println!(
                "Loss ratios: teacher {} / intermediate {} / student KL {} (T = {})",
                config.loss.teacher_weight,
                config.loss.intermediate_weight,
                config.loss.student_kl_weight,
                config.loss.temperature
            );
        }
        OutputFormat::Json => {
            let info = Info {
                config: &config,
                parameters,
            };
            let json = serde_json::to_string_pretty(&info)
                .map_err(|e| Error::Serialization(format!("JSON serialization error: {e}")))?;
            println!("{json}");
        }
    }

    Ok(())
}

fn run_forward(args: ForwardArgs) -> Result<()> {
    if args.batch_size == 0 || args.image_size == 0 {
        return Err(Error::InvalidParameter(
            "batch size and image size must be positive".to_string(),
        ));
    }

    let mut spec = read_spec(&args.config)?;
    apply_overrides(&mut spec.model, &args);
    let config = spec.validate()?;

    let mut net = MultiStudentNet::new(config.model.clone())?;
    let mut rng = StdRng::seed_from_u64(config.model.seed().wrapping_add(1));
    let objective = MultiStudentObjective::new(config.loss, &net.feature_channels(), &mut rng)?;

    let normal = Normal::new(0.0f32, 1.0)
        .map_err(|e| Error::InvalidParameter(format!("normal distribution: {e}")))?;
    let x = Array4::from_shape_simple_fn(
        (args.batch_size, INPUT_CHANNELS, args.image_size, args.image_size),
        || normal.sample(&mut rng),
    );
    let labels: Vec<usize> = (0..args.batch_size)
        .map(|_| rng.random_range(0..config.model.num_classes()))
        .collect();

    let ctx = if args.train {
        Context::new()
    } else {
        Context::evaluation()
    };
    let output = net.forward(&x, &ctx)?;

    println!("teacher logits: {:?}", output.teacher().dim());
    for (j, logits) in output.students().iter().enumerate() {
        println!("student {j} logits: {:?}", logits.dim());
    }
    for k in 0..3 {
        let shapes: Vec<_> = output
            .stage(k)
            .unwrap_or_default()
            .iter()
            .map(|f| f.dim())
            .collect();
        println!("stage {k} features: {shapes:?}");
    }

    let loss = objective.compute(&output, &labels)?;
    let json = serde_json::to_string_pretty(&loss)
        .map_err(|e| Error::Serialization(format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}

//! Loading experiment files

use super::schema::ExperimentSpec;
use super::validate::ExperimentConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read and parse an experiment file without validating it
pub fn read_spec<P: AsRef<Path>>(path: P) -> Result<ExperimentSpec> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    serde_yaml::from_str(&yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}

/// Parse and validate an experiment from YAML text
pub fn parse_config(yaml: &str) -> Result<ExperimentConfig> {
    let spec: ExperimentSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;
    Ok(spec.validate()?)
}

/// Read, parse and validate an experiment file
///
/// ```no_run
/// use renacido::config::load_config;
///
/// let config = load_config("experiment.yaml")?;
/// println!("{} students", config.model.num_students());
/// # Ok::<(), renacido::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ExperimentConfig> {
    let path = path.as_ref();
    let config = read_spec(path)?.validate()?;
    tracing::info!(
        path = %path.display(),
        backbone = %config.model.backbone(),
        students = config.model.num_students(),
        "loaded experiment config"
    );
    Ok(config)
}

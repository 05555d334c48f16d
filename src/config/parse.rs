use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, unexpanded_env_vars};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML in '{path}': {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

/// Loads, expands and validates a config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut config = parse_config_str(&yaml).map_err(|e| match e {
        ConfigError::YamlParse { source, .. } => ConfigError::YamlParse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Parses YAML text into a config after `$env{}` expansion. An empty document
/// yields the defaults.
pub fn parse_config_str(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);

    let missing = unexpanded_env_vars(&yaml);
    if !missing.is_empty() {
        return Err(ConfigError::ValidationList(
            missing
                .into_iter()
                .map(|name| format!("environment variable $env{{{}}} is not set", name))
                .collect(),
        ));
    }

    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }

    serde_yaml::from_str(&yaml).map_err(|source| ConfigError::YamlParse {
        path: "<inline>".to_string(),
        source,
    })
}

fn expand_paths(config: &mut Config) {
    config.collector.logs_dir = expand_tilde(&config.collector.logs_dir);
    config.collector.output_dir = expand_tilde(&config.collector.output_dir);
    config.processor.input_dir = expand_tilde(&config.processor.input_dir);
    config.processor.output_dir = expand_tilde(&config.processor.output_dir);
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_collector(&config.collector, &mut errors);
    validate_processor(&config.processor, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_collector(collector: &CollectorConfig, errors: &mut Vec<String>) {
    validate_interval("collector.scan_interval", collector.scan_interval, errors);
    validate_interval("collector.flush_interval", collector.flush_interval, errors);
    validate_interval("collector.stats_interval", collector.stats_interval, errors);

    if collector.file_suffix.is_empty() {
        errors.push("collector.file_suffix must not be empty".to_string());
    }
    if collector.logs_dir == collector.output_dir {
        errors.push(format!(
            "collector.output_dir '{}' must differ from collector.logs_dir",
            collector.output_dir.display()
        ));
    }
}

fn validate_processor(processor: &ProcessorConfig, errors: &mut Vec<String>) {
    validate_interval("processor.poll_interval", processor.poll_interval, errors);
    validate_interval("processor.stats_interval", processor.stats_interval, errors);

    if processor.input_prefix.is_empty() {
        errors.push("processor.input_prefix must not be empty".to_string());
    }
    if processor.input_dir == processor.output_dir {
        errors.push(format!(
            "processor.output_dir '{}' must differ from processor.input_dir",
            processor.output_dir.display()
        ));
    }

    let mut seen = HashSet::new();
    for (idx, route) in processor.routes.iter().enumerate() {
        if route.pattern.is_empty() {
            errors.push(format!("processor.routes[{}]: pattern must not be empty", idx));
        } else if !seen.insert(route.pattern.as_str()) {
            errors.push(format!(
                "processor.routes[{}]: duplicate pattern '{}' can never match",
                idx, route.pattern
            ));
        }
    }
}

fn validate_interval(name: &str, interval: Duration, errors: &mut Vec<String>) {
    if interval.is_zero() {
        errors.push(format!("{} must be greater than zero", name));
    }
}

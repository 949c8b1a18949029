use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.output_directory.trim().is_empty() {
        return Err(invalid("output_directory must not be empty"));
    }

    if config.worker_count == 0 {
        return Err(invalid("worker_count must be at least 1"));
    }

    let frame = &config.frame;
    if frame.max_width < 2 || frame.max_height < 2 {
        return Err(invalid("maximum frame size must be at least 2x2"));
    }
    if frame.max_width % 2 != 0 || frame.max_height % 2 != 0 {
        return Err(invalid(format!(
            "maximum frame size must be even, got {}x{}",
            frame.max_width, frame.max_height
        )));
    }
    if frame.min_viable_frames == 0 {
        return Err(invalid("min_viable_frames must be at least 1"));
    }
    if frame.max_frames == 0 {
        return Err(invalid("max_frames must be at least 1"));
    }
    if !frame.min_frame_rate.is_finite()
        || !frame.max_frame_rate.is_finite()
        || frame.min_frame_rate <= 0.0
        || frame.min_frame_rate > frame.max_frame_rate
    {
        return Err(invalid(format!(
            "frame rate range must satisfy 0 < min <= max, got {} to {}",
            frame.min_frame_rate, frame.max_frame_rate
        )));
    }

    let encoder = &config.encoder;
    if encoder.ffmpeg_path.trim().is_empty() {
        return Err(invalid("ffmpeg_path must not be empty"));
    }
    if encoder.derived_formats.len() < 2 {
        return Err(invalid(format!(
            "at least two derived container formats are required, got {}",
            encoder.derived_formats.len()
        )));
    }
    let mut formats = HashSet::new();
    formats.insert(encoder.primary_format.as_str());
    for format in &encoder.derived_formats {
        if !formats.insert(format.as_str()) {
            return Err(invalid(format!(
                "Container format '{}' is listed more than once",
                format
            )));
        }
    }

    let jobs = &config.jobs;
    if jobs.job_ceiling_hours == 0 {
        return Err(invalid("job_ceiling_hours must be positive"));
    }
    if !jobs.eta_seconds_per_frame.is_finite() || jobs.eta_seconds_per_frame < 0.0 {
        return Err(invalid("eta_seconds_per_frame must be a non-negative number"));
    }
    if jobs.watchdog_interval_secs == 0 {
        return Err(invalid("watchdog_interval_secs must be positive"));
    }

    let poller = &config.poller;
    if poller.poll_interval_secs == 0 || poller.query_timeout_secs == 0 {
        return Err(invalid("poller intervals must be positive"));
    }
    if poller.history_limit == 0 {
        return Err(invalid("history_limit must be at least 1"));
    }

    Ok(())
}

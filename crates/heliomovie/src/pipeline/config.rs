use std::path::PathBuf;

use crate::config::Config;
use crate::model::FrameLimits;
use crate::worker::RequestLimits;

pub struct PipelineConfig {
    pub output_directory: PathBuf,
    pub frame_limits: FrameLimits,
    pub request_limits: RequestLimits,
    pub min_viable_frames: usize,
    pub search_tolerance: chrono::Duration,
    pub job_ceiling: chrono::Duration,
    pub ffmpeg_path: PathBuf,
    pub primary_format: String,
    pub derived_formats: Vec<String>,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_directory: PathBuf::from(&config.output_directory),
            frame_limits: config.frame.limits(),
            request_limits: config.frame.request_limits(),
            min_viable_frames: config.frame.min_viable_frames,
            search_tolerance: chrono::Duration::seconds(
                i64::try_from(config.frame.search_tolerance_secs).unwrap_or(i64::MAX / 1000),
            ),
            job_ceiling: config.jobs.job_ceiling(),
            ffmpeg_path: PathBuf::from(&config.encoder.ffmpeg_path),
            primary_format: config.encoder.primary_format.clone(),
            derived_formats: config.encoder.derived_formats.clone(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::model::FrameLimits;
use crate::worker::RequestLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub output_directory: String,
    /// Public URL under which `output_directory` is served.
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// Fewer usable frames than this fails the job.
    #[serde(default = "default_min_viable_frames")]
    pub min_viable_frames: usize,
    /// Largest gap between a frame time and the image used for it.
    #[serde(default = "default_search_tolerance_secs")]
    pub search_tolerance_secs: u64,
    /// Largest `num_frames` a request may ask for.
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    #[serde(default = "default_min_frame_rate")]
    pub min_frame_rate: f64,
    #[serde(default = "default_max_frame_rate")]
    pub max_frame_rate: f64,
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

fn default_min_viable_frames() -> usize {
    2
}

fn default_search_tolerance_secs() -> u64 {
    3600
}

fn default_max_frames() -> u32 {
    RequestLimits::default().max_frames
}

fn default_min_frame_rate() -> f64 {
    RequestLimits::default().min_frame_rate
}

fn default_max_frame_rate() -> f64 {
    RequestLimits::default().max_frame_rate
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            min_viable_frames: default_min_viable_frames(),
            search_tolerance_secs: default_search_tolerance_secs(),
            max_frames: default_max_frames(),
            min_frame_rate: default_min_frame_rate(),
            max_frame_rate: default_max_frame_rate(),
        }
    }
}

impl FrameConfig {
    pub fn limits(&self) -> FrameLimits {
        FrameLimits {
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }

    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            max_frames: self.max_frames,
            min_frame_rate: self.min_frame_rate,
            max_frame_rate: self.max_frame_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_primary_format")]
    pub primary_format: String,
    /// Containers remuxed from the primary video.
    #[serde(default = "default_derived_formats")]
    pub derived_formats: Vec<String>,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_primary_format() -> String {
    "mp4".to_string()
}

fn default_derived_formats() -> Vec<String> {
    vec!["mov".to_string(), "flv".to_string()]
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            primary_format: default_primary_format(),
            derived_formats: default_derived_formats(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_job_ceiling_hours")]
    pub job_ceiling_hours: u64,
    #[serde(default = "default_eta_seconds_per_frame")]
    pub eta_seconds_per_frame: f64,
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
}

fn default_job_ceiling_hours() -> u64 {
    24
}

fn default_eta_seconds_per_frame() -> f64 {
    0.5
}

fn default_watchdog_interval_secs() -> u64 {
    300
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            job_ceiling_hours: default_job_ceiling_hours(),
            eta_seconds_per_frame: default_eta_seconds_per_frame(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
        }
    }
}

impl JobsConfig {
    pub fn job_ceiling(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::try_from(self.job_ceiling_hours).unwrap_or(i64::MAX / 3_600_000))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_first_poll_min_secs")]
    pub first_poll_min_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Where the movie history is saved. Defaults to the user data directory.
    #[serde(default)]
    pub history_path: Option<String>,
}

fn default_first_poll_min_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> usize {
    100
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            first_poll_min_secs: default_first_poll_min_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            history_limit: default_history_limit(),
            history_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Minimal configuration rooted at `output_directory`, everything else
    /// at its default.
    pub fn with_output_directory(output_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            output_directory: output_directory.into(),
            public_base_url: String::new(),
            worker_count: default_worker_count(),
            frame: FrameConfig::default(),
            encoder: EncoderConfig::default(),
            jobs: JobsConfig::default(),
            poller: PollerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

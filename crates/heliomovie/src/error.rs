use std::path::PathBuf;
use thiserror::Error;

use crate::worker::job::MovieStatus;

#[derive(Error, Debug)]
pub enum MovieError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

impl MovieError {
    /// Message safe to return to clients.
    pub fn public_message(&self) -> String {
        match self {
            MovieError::Pipeline(e) => e.public_message(),
            MovieError::Validation(e) => e.to_string(),
            MovieError::Geometry(e) => format!("invalid region of interest: {}", e),
            MovieError::Job(_) => "unknown movie".to_string(),
            _ => "the request could not be processed".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Rejected region of interest. Raised before any work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("region width is not positive (left {left}, right {right})")]
    EmptyWidth { left: f64, right: f64 },

    #[error("region height is not positive (top {top}, bottom {bottom})")]
    EmptyHeight { top: f64, bottom: f64 },

    #[error("image scale must be a positive finite number, got {0}")]
    InvalidScale(f64),

    #[error("region coordinates must be finite")]
    NotFinite,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("at least one visible layer is required")]
    NoVisibleLayers,

    #[error("layer with source id {0} is listed more than once")]
    DuplicateLayer(u32),

    #[error("malformed layer string '{0}'")]
    InvalidLayerString(String),

    #[error("number of frames must be at least 1, got {0}")]
    InvalidFrameCount(u32),

    #[error("frame rate must be a positive finite number, got {0}")]
    InvalidFrameRate(f64),

    #[error("at most {max} frames may be requested, got {requested}")]
    TooManyFrames { requested: u32, max: u32 },

    #[error("frame rate must be between {min} and {max} fps, got {rate}")]
    FrameRateOutOfRange { rate: f64, min: f64, max: f64 },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Job directory has no frames to keep as a thumbnail")]
    NoFrames,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("unknown movie '{0}'")]
    UnknownJob(String),

    #[error("movie '{id}' is already {status} and cannot change state")]
    AlreadyTerminal { id: String, status: MovieStatus },

    #[error("movie '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: MovieStatus,
        to: MovieStatus,
    },
}

pub type Result<T> = std::result::Result<T, MovieError>;

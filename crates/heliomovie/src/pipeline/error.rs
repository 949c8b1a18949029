use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::compositor::CompositeError;
use crate::encoder::EncodeError;
use crate::error::{GeometryError, StorageError};
use crate::sequencer::SequenceError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("Insufficient data: {viable} usable frames, {required} required")]
    InsufficientData { viable: usize, required: usize },

    #[error("Encoding failed: {0}")]
    Encode(EncodeError),

    #[error("Unsupported schedule: {num_frames} frames at {frame_rate} fps")]
    InvalidSchedule { num_frames: u32, frame_rate: f64 },

    #[error("Job deadline {deadline} exceeded")]
    Timeout { deadline: DateTime<Utc> },

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Compositing failed: {0}")]
    Composite(#[from] CompositeError),
}

impl From<EncodeError> for PipelineError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::TimedOut { deadline, .. } => PipelineError::Timeout { deadline },
            other => PipelineError::Encode(other),
        }
    }
}

impl From<SequenceError> for PipelineError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::InsufficientData { viable, required } => {
                PipelineError::InsufficientData { viable, required }
            }
            SequenceError::OutOfRange {
                num_frames,
                frame_rate,
            } => PipelineError::InvalidSchedule {
                num_frames,
                frame_rate,
            },
            SequenceError::Timeout { deadline } => PipelineError::Timeout { deadline },
            SequenceError::Composite(e) => PipelineError::Composite(e),
        }
    }
}

impl PipelineError {
    /// Message safe to show to the requesting user. Never contains paths or
    /// encoder output.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidGeometry(e) => format!("invalid region of interest: {}", e),
            PipelineError::InsufficientData { .. } => {
                "not enough images for the requested time range".to_string()
            }
            PipelineError::InvalidSchedule { .. } => {
                "the requested time range is not supported".to_string()
            }
            PipelineError::Encode(_) => "the movie could not be encoded".to_string(),
            PipelineError::Timeout { .. } => {
                "the movie did not finish in the allotted time".to_string()
            }
            PipelineError::Storage(_) | PipelineError::Composite(_) => {
                "the movie could not be written".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// Some frames were produced without every layer.
    DegradedFrames { count: usize },
    /// Some instants had no image at all and were left out.
    SkippedFrames { count: usize },
    /// Frame files could not be removed after a failure.
    CleanupFailed { error: String },
}

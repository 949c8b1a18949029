use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, ValidationError};
use crate::model::{LayerSet, RegionOfInterest};

/// Lifecycle state of a movie job. The numeric codes are part of the
/// status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl MovieStatus {
    pub fn code(self) -> u8 {
        match self {
            MovieStatus::Queued => 0,
            MovieStatus::Processing => 1,
            MovieStatus::Completed => 2,
            MovieStatus::Error => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MovieStatus::Queued),
            1 => Some(MovieStatus::Processing),
            2 => Some(MovieStatus::Completed),
            3 => Some(MovieStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MovieStatus::Completed | MovieStatus::Error)
    }

    /// Allowed edges: QUEUED → PROCESSING → COMPLETED, and any
    /// non-terminal state → ERROR.
    pub fn can_transition_to(self, next: MovieStatus) -> bool {
        match (self, next) {
            (MovieStatus::Queued, MovieStatus::Processing) => true,
            (MovieStatus::Processing, MovieStatus::Completed) => true,
            (MovieStatus::Queued | MovieStatus::Processing, MovieStatus::Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MovieStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovieStatus::Queued => write!(f, "queued"),
            MovieStatus::Processing => write!(f, "processing"),
            MovieStatus::Completed => write!(f, "completed"),
            MovieStatus::Error => write!(f, "error"),
        }
    }
}

/// Metadata recorded when a movie finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMovie {
    pub frame_rate: f64,
    pub num_frames: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub thumbnail_path: PathBuf,
    /// Container format (`mp4`, `mov`, ...) to file path.
    pub output_paths: BTreeMap<String, PathBuf>,
}

/// Bounds a movie request must respect to be accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestLimits {
    pub max_frames: u32,
    pub min_frame_rate: f64,
    pub max_frame_rate: f64,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_frames: 3000,
            min_frame_rate: 0.0001,
            max_frame_rate: 60.0,
        }
    }
}

/// A validated movie request. Immutable once the job is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRequest {
    pub layers: LayerSet,
    pub roi: RegionOfInterest,
    pub start_time: DateTime<Utc>,
    pub frame_rate: f64,
    pub num_frames: u32,
}

impl MovieRequest {
    /// Builds a request from an already resolved region.
    pub fn new(
        layers: LayerSet,
        roi: RegionOfInterest,
        start_time: DateTime<Utc>,
        frame_rate: f64,
        num_frames: u32,
        limits: &RequestLimits,
    ) -> Result<Self, ValidationError> {
        if !layers.has_visible() {
            return Err(ValidationError::NoVisibleLayers);
        }
        if num_frames < 1 {
            return Err(ValidationError::InvalidFrameCount(num_frames));
        }
        if num_frames > limits.max_frames {
            return Err(ValidationError::TooManyFrames {
                requested: num_frames,
                max: limits.max_frames,
            });
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(ValidationError::InvalidFrameRate(frame_rate));
        }
        if frame_rate < limits.min_frame_rate || frame_rate > limits.max_frame_rate {
            return Err(ValidationError::FrameRateOutOfRange {
                rate: frame_rate,
                min: limits.min_frame_rate,
                max: limits.max_frame_rate,
            });
        }

        Ok(Self {
            layers,
            roi,
            start_time,
            frame_rate,
            num_frames,
        })
    }

    /// Base name shared by every artifact of the movie.
    pub fn basename(&self) -> String {
        format!(
            "{}_{}",
            self.start_time.format("%Y_%m_%d_%H_%M_%S"),
            self.layers.to_filename_string()
        )
    }
}

/// Server-side lifecycle object for one movie request.
#[derive(Debug, Clone)]
pub struct MovieJob {
    pub id: String,
    pub token: String,
    pub request: MovieRequest,
    pub date_requested: DateTime<Utc>,
    pub eta_seconds: u64,
    status: MovieStatus,
    progress: f64,
    completed: Option<CompletedMovie>,
    error: Option<String>,
}

impl MovieJob {
    pub fn new(request: MovieRequest, eta_seconds: u64) -> Self {
        Self::requested_at(request, eta_seconds, Utc::now())
    }

    pub fn requested_at(
        request: MovieRequest,
        eta_seconds: u64,
        date_requested: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            token: uuid::Uuid::new_v4().simple().to_string(),
            request,
            date_requested,
            eta_seconds,
            status: MovieStatus::Queued,
            progress: 0.0,
            completed: None,
            error: None,
        }
    }

    pub fn status(&self) -> MovieStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn completed(&self) -> Option<&CompletedMovie> {
        self.completed.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: MovieStatus) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Moves the job to PROCESSING. Calling it again while processing is a
    /// no-op.
    pub fn start_processing(&mut self) -> Result<(), JobError> {
        if self.status == MovieStatus::Processing {
            return Ok(());
        }
        self.transition(MovieStatus::Processing)
    }

    /// Records progress. Values are clamped to `[0, 1]` and never decrease.
    pub fn set_progress(&mut self, progress: f64) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: self.id.clone(),
                status: self.status,
            });
        }
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.progress = self.progress.max(progress);
        Ok(())
    }

    pub fn complete(&mut self, movie: CompletedMovie) -> Result<(), JobError> {
        self.transition(MovieStatus::Completed)?;
        self.progress = 1.0;
        self.completed = Some(movie);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobError> {
        self.transition(MovieStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.date_requested
    }

    /// Whether the job is still running past the wall-clock ceiling.
    pub fn is_expired(&self, now: DateTime<Utc>, ceiling: chrono::Duration) -> bool {
        !self.is_terminal() && self.age(now) > ceiling
    }

    /// Instant after which the job is considered wedged.
    pub fn deadline(&self, ceiling: chrono::Duration) -> DateTime<Utc> {
        self.date_requested + ceiling
    }

    /// Frames still to be produced, used for ETA estimation.
    pub fn remaining_frames(&self) -> f64 {
        if self.is_terminal() {
            return 0.0;
        }
        f64::from(self.request.num_frames) * (1.0 - self.progress)
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub success: bool,
    pub output_paths: BTreeMap<String, PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub degraded_frames: usize,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &MovieJob, movie: &CompletedMovie, degraded_frames: usize) -> Self {
        Self {
            job_id: job.id.clone(),
            success: true,
            output_paths: movie.output_paths.clone(),
            thumbnail_path: Some(movie.thumbnail_path.clone()),
            degraded_frames,
            error: None,
        }
    }

    pub fn failure(job: &MovieJob, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            success: false,
            output_paths: BTreeMap::new(),
            thumbnail_path: None,
            degraded_frames: 0,
            error: Some(error),
        }
    }
}

//! Movie job progress broadcaster for real-time status streaming.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::MovieStatus;

/// Step of movie generation a job is in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Compositing,
    Encoding,
    Finalizing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Compositing => write!(f, "Compositing frames"),
            JobPhase::Encoding => write!(f, "Encoding"),
            JobPhase::Finalizing => write!(f, "Finalizing"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a movie job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    /// Artifact base name of the movie.
    pub name: String,
    pub phase: JobPhase,
    pub status: MovieStatus,
    /// Fraction of frames composited, in `[0, 1]`.
    pub progress: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Container format to file path (set on completion).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, name: &str, phase: JobPhase, progress: f64, message: &str) -> Self {
        let status = match phase {
            JobPhase::Queued => MovieStatus::Queued,
            JobPhase::Completed => MovieStatus::Completed,
            JobPhase::Failed => MovieStatus::Error,
            _ => MovieStatus::Processing,
        };

        Self {
            job_id: job_id.to_string(),
            name: name.to_string(),
            phase,
            status,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            outputs: BTreeMap::new(),
            error: None,
        }
    }

    pub fn completed(job_id: &str, name: &str, outputs: BTreeMap<String, String>) -> Self {
        let mut event = Self::new(job_id, name, JobPhase::Completed, 1.0, "Movie is ready");
        event.outputs = outputs;
        event
    }

    pub fn failed(job_id: &str, name: &str, progress: f64, error: &str) -> Self {
        let mut event = Self::new(job_id, name, JobPhase::Failed, progress, "Movie generation failed");
        event.error = Some(error.to_string());
        event
    }
}

/// Broadcasts job progress events to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

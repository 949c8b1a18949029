use std::sync::Arc;

use crate::broadcast::{JobPhase, JobStore};
use crate::worker::job::CompletedMovie;

/// Events emitted by the pipeline while a movie is built.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Processing,
    /// Fraction of frames attempted, in `[0, 1]`.
    Progress(f64),
    /// Every frame is composited and the encoder is running.
    Encoding,
    Finalizing,
    Completed(CompletedMovie),
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests and screenshots.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Applies pipeline events to a job in the store.
///
/// Transitions rejected by the store (late events for a job the watchdog
/// already expired, for instance) are logged and dropped.
pub struct StoreProgress {
    store: Arc<JobStore>,
    job_id: String,
}

impl StoreProgress {
    pub fn new(store: Arc<JobStore>, job_id: &str) -> Self {
        Self {
            store,
            job_id: job_id.to_string(),
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) {
        let result = match event {
            ProgressEvent::Processing => self.store.mark_processing(&self.job_id),
            ProgressEvent::Progress(fraction) => self.store.update_progress(&self.job_id, fraction),
            ProgressEvent::Encoding => {
                self.store
                    .enter_phase(&self.job_id, JobPhase::Encoding, "Encoding video")
            }
            ProgressEvent::Finalizing => {
                self.store
                    .enter_phase(&self.job_id, JobPhase::Finalizing, "Finalizing movie")
            }
            ProgressEvent::Completed(movie) => self.store.complete(&self.job_id, movie),
            ProgressEvent::Failed { error } => self.store.fail(&self.job_id, &error),
        };

        if let Err(e) = result {
            log::warn!("Ignoring late event for job {}: {}", self.job_id, e);
        }
    }
}

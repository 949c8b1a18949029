//! In-memory store of movie jobs, shared by the API and the workers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::broadcast::job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
use crate::error::JobError;
use crate::worker::job::{CompletedMovie, MovieJob, MovieStatus};

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Authoritative job state, keyed by job id.
///
/// Every transition goes through [`MovieJob`]'s state machine, so a job that
/// reached COMPLETED or ERROR never changes again. Each accepted change is
/// forwarded to the broadcaster when one is attached.
pub struct JobStore {
    jobs: RwLock<HashMap<String, MovieJob>>,
    broadcaster: Option<JobProgressBroadcaster>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(broadcaster: JobProgressBroadcaster) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            broadcaster: Some(broadcaster),
        }
    }

    pub fn broadcaster(&self) -> Option<&JobProgressBroadcaster> {
        self.broadcaster.as_ref()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, MovieJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MovieJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn emit(&self, event: JobProgressEvent) {
        if let Some(ref broadcaster) = self.broadcaster {
            broadcaster.send(event);
        }
    }

    /// Applies `change` to the job and returns the updated copy.
    fn modify<F>(&self, job_id: &str, change: F) -> Result<MovieJob, JobError>
    where
        F: FnOnce(&mut MovieJob) -> Result<(), JobError>,
    {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))?;
        change(job)?;
        Ok(job.clone())
    }

    /// Registers a freshly queued job and returns its id.
    pub fn insert(&self, job: MovieJob) -> String {
        let id = job.id.clone();
        let event = JobProgressEvent::new(
            &id,
            &job.request.basename(),
            JobPhase::Queued,
            0.0,
            "Movie queued",
        );
        self.write().insert(id.clone(), job);
        self.emit(event);
        id
    }

    pub fn get(&self, job_id: &str) -> Option<MovieJob> {
        self.read().get(job_id).cloned()
    }

    /// Returns the job only when `token` matches. A wrong token is reported
    /// the same way as a missing job.
    pub fn status(&self, job_id: &str, token: &str) -> Result<MovieJob, JobError> {
        match self.read().get(job_id) {
            Some(job) if job.token == token => Ok(job.clone()),
            _ => Err(JobError::UnknownJob(job_id.to_string())),
        }
    }

    pub fn mark_processing(&self, job_id: &str) -> Result<(), JobError> {
        let job = self.modify(job_id, MovieJob::start_processing)?;
        self.emit(JobProgressEvent::new(
            job_id,
            &job.request.basename(),
            JobPhase::Compositing,
            job.progress(),
            "Processing started",
        ));
        Ok(())
    }

    pub fn update_progress(&self, job_id: &str, progress: f64) -> Result<(), JobError> {
        let job = self.modify(job_id, |job| job.set_progress(progress))?;
        self.emit(JobProgressEvent::new(
            job_id,
            &job.request.basename(),
            JobPhase::Compositing,
            job.progress(),
            &format!("{:.0}% of frames composited", job.progress() * 100.0),
        ));
        Ok(())
    }

    /// Announces a later processing phase. Fails for jobs that already
    /// finished.
    pub fn enter_phase(&self, job_id: &str, phase: JobPhase, message: &str) -> Result<(), JobError> {
        let job = self.modify(job_id, MovieJob::start_processing)?;
        self.emit(JobProgressEvent::new(
            job_id,
            &job.request.basename(),
            phase,
            job.progress(),
            message,
        ));
        Ok(())
    }

    pub fn complete(&self, job_id: &str, movie: CompletedMovie) -> Result<(), JobError> {
        let outputs: BTreeMap<String, String> = movie
            .output_paths
            .iter()
            .map(|(format, path)| (format.clone(), path.display().to_string()))
            .collect();
        let job = self.modify(job_id, move |job| job.complete(movie))?;
        self.emit(JobProgressEvent::completed(
            job_id,
            &job.request.basename(),
            outputs,
        ));
        Ok(())
    }

    pub fn fail(&self, job_id: &str, message: &str) -> Result<(), JobError> {
        let job = self.modify(job_id, |job| job.fail(message))?;
        self.emit(JobProgressEvent::failed(
            job_id,
            &job.request.basename(),
            job.progress(),
            message,
        ));
        Ok(())
    }

    /// Fails every non-terminal job older than `ceiling`. Returns the ids of
    /// the jobs that were expired.
    pub fn expire_stale(&self, now: DateTime<Utc>, ceiling: chrono::Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .read()
            .values()
            .filter(|job| job.is_expired(now, ceiling))
            .map(|job| job.id.clone())
            .collect();

        let message = format!(
            "movie did not finish within {} hours",
            ceiling.num_hours().max(1)
        );

        stale
            .into_iter()
            .filter(|id| match self.fail(id, &message) {
                Ok(()) => {
                    log::warn!("Expired movie job {} after {} hours", id, ceiling.num_hours());
                    true
                }
                Err(e) => {
                    log::debug!("Job {} finished before it could be expired: {}", id, e);
                    false
                }
            })
            .collect()
    }

    pub fn remove(&self, job_id: &str) -> Option<MovieJob> {
        self.write().remove(job_id)
    }

    /// Frames still to be produced across all unfinished jobs.
    pub fn queued_frames(&self) -> f64 {
        self.read().values().map(MovieJob::remaining_frames).sum()
    }

    /// All jobs, newest request first.
    pub fn list(&self) -> Vec<MovieJob> {
        let mut jobs: Vec<MovieJob> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.date_requested.cmp(&a.date_requested));
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.read().values() {
            match job.status() {
                MovieStatus::Queued => counts.queued += 1,
                MovieStatus::Processing => counts.processing += 1,
                MovieStatus::Completed => counts.completed += 1,
                MovieStatus::Error => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

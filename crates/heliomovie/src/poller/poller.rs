//! Client-side status polling.
//!
//! One task per movie. The first query fires after the server's ETA (at
//! least `first_poll_min`), then every `poll_interval` until the movie
//! finishes, fails, or exceeds the job ceiling. Removing the movie from the
//! history cancels its monitor at the next wake-up.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::StatusResponse;
use crate::config::Config;
use crate::worker::job::MovieStatus;

use super::client::StatusClient;
use super::history::{HistoryEntry, MovieHistory};
use super::notify::{Notification, Notifier};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub first_poll_min: Duration,
    pub poll_interval: Duration,
    pub query_timeout: Duration,
    pub job_ceiling: Duration,
}

impl PollerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            first_poll_min: Duration::from_secs(config.poller.first_poll_min_secs),
            poll_interval: Duration::from_secs(config.poller.poll_interval_secs),
            query_timeout: Duration::from_secs(config.poller.query_timeout_secs),
            job_ceiling: config.jobs.job_ceiling().to_std().unwrap_or(Duration::ZERO),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            first_poll_min: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
            job_ceiling: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// How a monitor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    /// The ceiling passed without a terminal answer.
    TimedOut,
    /// The movie was removed from the history.
    Cancelled,
}

#[derive(Clone)]
pub struct StatusPoller {
    client: Arc<dyn StatusClient>,
    notifier: Arc<dyn Notifier>,
    history: Arc<Mutex<MovieHistory>>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(
        client: Arc<dyn StatusClient>,
        notifier: Arc<dyn Notifier>,
        history: MovieHistory,
        config: PollerConfig,
    ) -> Self {
        Self {
            client,
            notifier,
            history: Arc::new(Mutex::new(history)),
            config,
        }
    }

    pub fn history(&self) -> Arc<Mutex<MovieHistory>> {
        Arc::clone(&self.history)
    }

    fn lock_history(&self) -> MutexGuard<'_, MovieHistory> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Movie history lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Snapshot of one history entry.
    pub fn entry(&self, id: &str) -> Option<HistoryEntry> {
        self.lock_history().get(id).cloned()
    }

    /// Removes a movie from the history, which stops its monitor.
    pub fn cancel(&self, id: &str) -> bool {
        let mut history = self.lock_history();
        let removed = history.remove(id).is_some();
        if removed {
            history.persist();
        }
        removed
    }

    /// Records a freshly submitted movie and starts monitoring it.
    pub fn track(&self, entry: HistoryEntry) -> JoinHandle<PollOutcome> {
        let (id, token, date, eta) = (
            entry.id.clone(),
            entry.token.clone(),
            entry.date_requested,
            entry.eta_seconds,
        );
        {
            let mut history = self.lock_history();
            history.add(entry);
            history.persist();
        }
        self.spawn_monitor(id, date, token, eta)
    }

    /// Starts a monitor task for a movie already in the history. Must be
    /// called from within a tokio runtime.
    pub fn spawn_monitor(
        &self,
        id: String,
        date_requested: DateTime<Utc>,
        token: String,
        eta_seconds: u64,
    ) -> JoinHandle<PollOutcome> {
        let poller = self.clone();
        tokio::spawn(async move {
            poller
                .monitor(&id, date_requested, &token, eta_seconds)
                .await
        })
    }

    /// Restarts monitors for every movie the history lists as queued or
    /// processing.
    pub fn resume_unfinished(&self) -> Vec<JoinHandle<PollOutcome>> {
        let unfinished = self.lock_history().unfinished();
        info!(count = unfinished.len(), "Resuming movie monitors");
        unfinished
            .into_iter()
            .map(|entry| self.spawn_monitor(entry.id, entry.date_requested, entry.token, 0))
            .collect()
    }

    async fn monitor(
        &self,
        id: &str,
        date_requested: DateTime<Utc>,
        token: &str,
        eta_seconds: u64,
    ) -> PollOutcome {
        let started = Instant::now();
        let age_at_start = (Utc::now() - date_requested)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let age = || age_at_start + started.elapsed();

        let mut delay = Duration::from_secs(eta_seconds).max(self.config.first_poll_min);

        loop {
            tokio::time::sleep(delay).await;
            delay = self.config.poll_interval;

            if !self.lock_history().contains(id) {
                debug!(job_id = %id, "Movie removed from history, stopping monitor");
                return PollOutcome::Cancelled;
            }

            let left = self.config.job_ceiling.saturating_sub(age());
            let bound = self.config.query_timeout.min(left);
            let response = if bound.is_zero() {
                None
            } else {
                match tokio::time::timeout(bound, self.client.query(id, token)).await {
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(e)) => {
                        debug!(job_id = %id, error = %e, "Status query failed");
                        None
                    }
                    Err(_) => {
                        debug!(job_id = %id, "Status query timed out");
                        None
                    }
                }
            };

            if !self.lock_history().contains(id) {
                debug!(job_id = %id, "Movie removed from history, stopping monitor");
                return PollOutcome::Cancelled;
            }

            match response {
                Some(StatusResponse::Completed(done)) => {
                    let name = {
                        let mut history = self.lock_history();
                        history.record_completed(id, done);
                        history.persist();
                        let name = history.get(id).map(|e| e.name.clone());
                        name.unwrap_or_default()
                    };
                    info!(job_id = %id, "Movie completed");
                    self.notifier.notify(Notification::completed(id, &name));
                    return PollOutcome::Completed;
                }
                Some(StatusResponse::Failed(failed)) => {
                    self.record_failure(id, &failed.error);
                    return PollOutcome::Failed;
                }
                Some(StatusResponse::Pending(pending)) => {
                    let status =
                        MovieStatus::from_code(pending.status).unwrap_or(MovieStatus::Queued);
                    let mut history = self.lock_history();
                    if history.update_status(id, status, pending.progress) {
                        history.persist();
                    }
                }
                None => {}
            }

            if age() > self.config.job_ceiling {
                let hours = self.config.job_ceiling.as_secs() / 3600;
                self.record_failure(id, &format!("movie did not finish within {} hours", hours));
                return PollOutcome::TimedOut;
            }
        }
    }

    fn record_failure(&self, id: &str, error: &str) {
        {
            let mut history = self.lock_history();
            history.record_failed(id, error);
            history.persist();
        }
        warn!(job_id = %id, "Movie failed: {}", error);
        self.notifier.notify(Notification::failed(id));
    }
}

//! Periodic sweep that fails jobs running past the wall-clock ceiling.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::broadcast::job_store::JobStore;
use crate::error::WorkerError;

pub struct Watchdog {
    store: Arc<JobStore>,
    interval: Duration,
    ceiling: chrono::Duration,
    shutdown: watch::Sender<bool>,
}

impl Watchdog {
    pub fn new(store: Arc<JobStore>, interval: Duration, ceiling: chrono::Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            interval,
            ceiling,
            shutdown,
        }
    }

    /// Runs one sweep immediately. Returns the ids of expired jobs.
    pub fn sweep(&self) -> Vec<String> {
        self.store.expire_stale(Utc::now(), self.ceiling)
    }

    /// Starts the sweep loop on a background thread.
    pub fn start(&self) -> Result<JoinHandle<()>, WorkerError> {
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let ceiling = self.ceiling;
        let mut shutdown_rx = self.shutdown.subscribe();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        std::thread::Builder::new()
            .name("movie-watchdog".to_string())
            .spawn(move || {
                rt.block_on(async {
                    let mut timer = tokio::time::interval(interval);
                    timer.tick().await; // skip immediate first tick

                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }

                        tokio::select! {
                            _ = timer.tick() => {
                                let expired = store.expire_stale(Utc::now(), ceiling);
                                if !expired.is_empty() {
                                    log::info!("Watchdog expired {} movie job(s)", expired.len());
                                }
                            }
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }

                    log::debug!("Watchdog stopped");
                });
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
    }

    /// Signals the sweep loop to stop.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FrameLimits, Layer, LayerSet, RegionOfInterest};
    use crate::worker::job::{MovieJob, MovieRequest, MovieStatus, RequestLimits};

    fn old_job(hours: i64) -> MovieJob {
        let layers = LayerSet::new(vec![Layer::new(3, true, 100)]).unwrap();
        let roi = RegionOfInterest::resolve(0.0, 0.0, 100.0, 100.0, 1.0, &FrameLimits::default())
            .unwrap();
        let request = MovieRequest::new(layers, roi, Utc::now(), 10.0, 5, &RequestLimits::default())
            .unwrap();
        MovieJob::requested_at(request, 5, Utc::now() - chrono::Duration::hours(hours))
    }

    #[test]
    fn test_sweep_expires_old_jobs() {
        let store = Arc::new(JobStore::new());
        let old = store.insert(old_job(48));
        let recent = store.insert(old_job(1));

        let watchdog = Watchdog::new(
            Arc::clone(&store),
            Duration::from_secs(60),
            chrono::Duration::hours(24),
        );
        assert_eq!(watchdog.sweep(), vec![old.clone()]);
        assert_eq!(store.get(&old).unwrap().status(), MovieStatus::Error);
        assert_eq!(store.get(&recent).unwrap().status(), MovieStatus::Queued);
    }

    #[test]
    fn test_background_loop_expires_and_stops() {
        let store = Arc::new(JobStore::new());
        let old = store.insert(old_job(48));

        let watchdog = Watchdog::new(
            Arc::clone(&store),
            Duration::from_millis(20),
            chrono::Duration::hours(24),
        );
        let handle = watchdog.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while store.get(&old).unwrap().status() != MovieStatus::Error {
            assert!(std::time::Instant::now() < deadline, "watchdog never swept");
            std::thread::sleep(Duration::from_millis(10));
        }

        watchdog.stop();
        handle.join().expect("watchdog thread panicked");
    }
}

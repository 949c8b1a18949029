use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStore, Watchdog};
use crate::compositor::ImageSource;
use crate::config::Config;
use crate::error::{Result, WorkerError};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::sanitize;
use crate::worker::job::{MovieJob, MovieRequest, MovieStatus};
use crate::worker::WorkerPool;

use super::types::{
    CompletedStatus, Request, Response, ScreenshotRequest, ScreenshotResponse, StatusResponse,
    SubmitRequest, SubmitResponse,
};

/// Service-level settings that are not part of the pipeline itself.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub worker_count: usize,
    pub public_base_url: String,
    pub eta_seconds_per_frame: f64,
    pub watchdog_interval: Duration,
    pub job_ceiling: chrono::Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            public_base_url: config.public_base_url.clone(),
            eta_seconds_per_frame: config.jobs.eta_seconds_per_frame,
            watchdog_interval: Duration::from_secs(config.jobs.watchdog_interval_secs),
            job_ceiling: config.jobs.job_ceiling(),
        }
    }
}

/// In-process front door: accepts movie requests, answers status queries
/// and takes screenshots.
pub struct MovieService {
    settings: ServiceSettings,
    pipeline: Arc<Pipeline>,
    store: Arc<JobStore>,
    pool: WorkerPool,
    watchdog: Watchdog,
    watchdog_handle: Option<JoinHandle<()>>,
}

impl MovieService {
    /// Builds the service with the production ffmpeg encoder.
    pub fn from_config(config: &Config, source: Arc<dyn ImageSource>) -> Result<Self> {
        let pipeline = Pipeline::from_config(Arc::new(PipelineConfig::from_config(config)), source);
        Self::new(pipeline, ServiceSettings::from_config(config))
    }

    /// Starts the worker pool and the watchdog around `pipeline`.
    pub fn new(pipeline: Pipeline, settings: ServiceSettings) -> Result<Self> {
        let store = Arc::new(JobStore::with_broadcaster(JobProgressBroadcaster::default()));
        let pipeline = Arc::new(pipeline);
        let pool = WorkerPool::new(
            Arc::clone(&pipeline),
            Arc::clone(&store),
            settings.worker_count,
        )?;

        let watchdog = Watchdog::new(
            Arc::clone(&store),
            settings.watchdog_interval,
            settings.job_ceiling,
        );
        let watchdog_handle = Some(watchdog.start()?);

        info!(
            "Movie service ready ({} workers, output {})",
            settings.worker_count,
            sanitize::redact_path(&pipeline.config().output_directory)
        );

        Ok(Self {
            settings,
            pipeline,
            store,
            pool,
            watchdog,
            watchdog_handle,
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Job progress events for observers. `None` never happens for a
    /// service built with `new`.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<JobProgressEvent>> {
        self.store.broadcaster().map(JobProgressBroadcaster::subscribe)
    }

    pub fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::QueueMovie(submit) => self.queue_movie(submit).map(Response::Submitted),
            Request::GetMovieStatus { id, token } => {
                self.movie_status(&id, &token).map(Response::Status)
            }
            Request::TakeScreenshot(shot) => self.take_screenshot(shot).map(Response::Screenshot),
        }
    }

    /// Validates and queues a movie. Invalid requests never reach the store.
    pub fn queue_movie(&self, submit: SubmitRequest) -> Result<SubmitResponse> {
        let layers = submit.layers.into_layer_set()?;
        let roi = submit.roi.resolve(&self.pipeline.config().frame_limits)?;
        let request = MovieRequest::new(
            layers,
            roi,
            submit.start_time,
            submit.frame_rate,
            submit.num_frames,
            &self.pipeline.config().request_limits,
        )?;

        let eta = self.estimate_eta(request.num_frames);
        let job = MovieJob::new(request, eta);
        let id = self.store.insert(job.clone());
        let token = job.token.clone();

        debug!(
            "Queued movie {} ({} frames, eta {}s, token {})",
            id,
            job.request.num_frames,
            eta,
            sanitize::redact_token(&token)
        );

        if let Err(e) = self.pool.submit(job) {
            warn!("Failed to hand movie {} to the worker pool: {}", id, e);
            let message = match &e {
                WorkerError::QueueFull { .. } => "the server is busy, try again later",
                _ => "the movie could not be queued",
            };
            if let Err(fail) = self.store.fail(&id, message) {
                warn!("Failed to mark movie {} as failed: {}", id, fail);
            }
            return Err(e.into());
        }

        Ok(SubmitResponse { id, token, eta })
    }

    /// `ceil((frames queued ahead + num_frames) * seconds per frame)`, at
    /// least one second.
    fn estimate_eta(&self, num_frames: u32) -> u64 {
        let frames = self.store.queued_frames() + f64::from(num_frames);
        let seconds = (frames * self.settings.eta_seconds_per_frame).ceil();
        if seconds.is_finite() && seconds >= 1.0 {
            seconds as u64
        } else {
            1
        }
    }

    pub fn movie_status(&self, id: &str, token: &str) -> Result<StatusResponse> {
        let job = self.store.status(id, token)?;
        Ok(self.status_response(&job))
    }

    fn status_response(&self, job: &MovieJob) -> StatusResponse {
        match job.status() {
            MovieStatus::Completed => match job.completed() {
                Some(movie) => {
                    let primary = movie
                        .output_paths
                        .get(&self.pipeline.config().primary_format)
                        .or_else(|| movie.output_paths.values().next());
                    StatusResponse::Completed(CompletedStatus {
                        status: MovieStatus::Completed.code(),
                        frame_rate: movie.frame_rate,
                        num_frames: movie.num_frames,
                        start_date: movie.start_date,
                        end_date: movie.end_date,
                        width: movie.width,
                        height: movie.height,
                        thumbnail_url: self.public_url(&movie.thumbnail_path),
                        url: primary.map(|p| self.public_url(p)).unwrap_or_default(),
                    })
                }
                None => StatusResponse::pending(MovieStatus::Completed, 1.0),
            },
            MovieStatus::Error => {
                StatusResponse::failed(job.error().unwrap_or("the movie could not be created"))
            }
            status => StatusResponse::pending(status, job.progress()),
        }
    }

    /// Public URL of a generated file: the output root replaced by the
    /// configured base URL. Files outside the root are reduced to their name.
    fn public_url(&self, path: &Path) -> String {
        let relative = self
            .pipeline
            .storage()
            .relative_path(path)
            .unwrap_or_else(|| sanitize::redact_path(path));
        let base = self.settings.public_base_url.trim_end_matches('/');
        if base.is_empty() {
            relative
        } else {
            format!("{}/{}", base, relative)
        }
    }

    /// Composites one frame synchronously.
    pub fn take_screenshot(&self, request: ScreenshotRequest) -> Result<ScreenshotResponse> {
        let layers = request.layers.into_layer_set()?;
        let roi = request.roi.resolve(&self.pipeline.config().frame_limits)?;

        let shot = self.pipeline.screenshot(&layers, roi, request.date)?;
        if !shot.skipped_layers.is_empty() {
            debug!("Screenshot {} skipped layers {:?}", shot.id, shot.skipped_layers);
        }

        Ok(ScreenshotResponse {
            url: self.public_url(&shot.path),
            id: shot.id,
            width: shot.width,
            height: shot.height,
        })
    }

    /// Stops the watchdog and drains the worker pool.
    pub fn shutdown(mut self) {
        self.watchdog.stop();
        if let Some(handle) = self.watchdog_handle.take() {
            if handle.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }

        self.pool.shutdown();
        self.pool.wait();
    }
}

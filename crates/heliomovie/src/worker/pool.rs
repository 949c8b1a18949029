use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::broadcast::JobStore;
use crate::error::WorkerError;
use crate::pipeline::{Pipeline, StoreProgress};
use crate::worker::job::{JobResult, MovieJob};

pub struct WorkerPool {
    job_sender: Sender<MovieJob>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` threads, each running whole movie jobs.
    ///
    /// Job state is written to `store` as the pipeline advances. Results are
    /// also offered on the result channel; when nobody drains it, surplus
    /// results are dropped instead of stalling the workers.
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<JobStore>,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be at least 1".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<MovieJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);
            let worker_store = Arc::clone(&store);

            let handle = thread::Builder::new()
                .name(format!("movie-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        worker_pipeline,
                        worker_store,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} movie workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Queues a job without waiting. Fails with `QueueFull` when every
    /// queue slot is taken.
    pub fn submit(&self, job: MovieJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => {
                warn!("Worker queue full, rejecting job {}", job.id);
                WorkerError::QueueFull {
                    capacity: self.job_sender.capacity().unwrap_or_default(),
                }
            }
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Jobs waiting for a free worker.
    pub fn pending(&self) -> usize {
        self.job_sender.len()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<MovieJob>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    store: Arc<JobStore>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                if store.get(&job.id).map_or(true, |stored| stored.is_terminal()) {
                    debug!("Worker {} skipping finished job {}", worker_id, job.id);
                    continue;
                }

                debug!("Worker {} processing job {}", worker_id, job.id);
                let progress = StoreProgress::new(Arc::clone(&store), &job.id);
                let result = pipeline.run(&job, &progress);

                match result_sender.try_send(result) {
                    Ok(()) => {}
                    Err(TrySendError::Full(result)) => {
                        debug!("Result channel full, dropping result for {}", result.job_id);
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        warn!("Worker {} result channel disconnected", worker_id);
                        break;
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use chrono::{DateTime, TimeZone, Utc};
    use image::{ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    use crate::compositor::{ImageRef, MemoryCatalog};
    use crate::encoder::{EncodeError, EncodeSpec, VideoEncoder};
    use crate::model::{FrameLimits, Layer, LayerSet, RegionOfInterest};
    use crate::pipeline::PipelineConfig;
    use crate::worker::job::{MovieRequest, MovieStatus, RequestLimits};

    struct TouchEncoder;

    impl VideoEncoder for TouchEncoder {
        fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
            let path = spec.primary_path();
            std::fs::write(&path, b"mp4").unwrap();
            Ok(path)
        }

        fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
            let output = spec.output_path(format);
            std::fs::write(&output, b"copy").unwrap();
            Ok(output)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 6, 1, 12, 0, 0).unwrap()
    }

    /// Holds the primary encode until the gate sender is dropped.
    struct GateEncoder {
        gate: Receiver<()>,
    }

    impl VideoEncoder for GateEncoder {
        fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
            let _ = self.gate.recv();
            TouchEncoder.encode_primary(spec)
        }

        fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
            TouchEncoder.derive(spec, format)
        }
    }

    fn create_pipeline(images: &Path, output: &Path) -> Arc<Pipeline> {
        create_pipeline_with(images, output, Box::new(TouchEncoder))
    }

    fn create_pipeline_with(
        images: &Path,
        output: &Path,
        encoder: Box<dyn VideoEncoder>,
    ) -> Arc<Pipeline> {
        let image_path = images.join("aia.png");
        RgbaImage::from_pixel(16, 16, Rgba([200, 120, 40, 255]))
            .save_with_format(&image_path, ImageFormat::Png)
            .unwrap();
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.add(ImageRef {
            source_id: 10,
            date: start(),
            path: image_path,
            scale: 1.0,
            sun_center: (8.0, 8.0),
        });

        let config = PipelineConfig {
            output_directory: output.to_path_buf(),
            frame_limits: FrameLimits::default(),
            request_limits: RequestLimits::default(),
            min_viable_frames: 2,
            search_tolerance: chrono::Duration::hours(1),
            job_ceiling: chrono::Duration::hours(24),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            primary_format: "mp4".to_string(),
            derived_formats: vec!["mov".to_string(), "flv".to_string()],
        };
        Arc::new(Pipeline::with_encoder(Arc::new(config), catalog, encoder))
    }

    fn movie_job() -> MovieJob {
        let layers = LayerSet::new(vec![Layer::new(10, true, 100)]).unwrap();
        let roi = RegionOfInterest::resolve(-4.0, -4.0, 4.0, 4.0, 1.0, &FrameLimits::default())
            .unwrap();
        let request =
            MovieRequest::new(layers, roi, start(), 4.0, 3, &RequestLimits::default()).unwrap();
        MovieJob::new(request, 1)
    }

    #[test]
    fn test_worker_pool_creation() {
        let images = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let pool = WorkerPool::new(
            create_pipeline(images.path(), output.path()),
            Arc::new(JobStore::new()),
            2,
        )
        .unwrap();

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.submit(movie_job()),
            Err(WorkerError::ChannelClosed)
        ));

        pool.wait();
    }

    #[test]
    fn test_zero_workers_rejected() {
        let images = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let result = WorkerPool::new(
            create_pipeline(images.path(), output.path()),
            Arc::new(JobStore::new()),
            0,
        );
        assert!(matches!(result, Err(WorkerError::SpawnFailed(_))));
    }

    #[test]
    fn test_submit_and_process_movie_job() {
        let images = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let store = Arc::new(JobStore::new());
        let pool = WorkerPool::new(
            create_pipeline(images.path(), output.path()),
            Arc::clone(&store),
            2,
        )
        .unwrap();

        let job = movie_job();
        let id = store.insert(job.clone());
        pool.submit(job).unwrap();

        let result = pool.recv_result_timeout(Duration::from_secs(30)).unwrap();
        assert!(result.success, "Job failed: {:?}", result.error);
        assert_eq!(result.job_id, id);
        assert_eq!(result.output_paths.len(), 3);

        let stored = store.get(&id).unwrap();
        assert_eq!(stored.status(), MovieStatus::Completed);
        assert_eq!(stored.progress(), 1.0);
        assert_eq!(stored.completed().unwrap().num_frames, 3);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_expired_job_is_not_processed() {
        let images = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let store = Arc::new(JobStore::new());
        let pool = WorkerPool::new(
            create_pipeline(images.path(), output.path()),
            Arc::clone(&store),
            1,
        )
        .unwrap();

        let job = movie_job();
        let id = store.insert(job.clone());
        store.fail(&id, "movie did not finish within 24 hours").unwrap();
        pool.submit(job).unwrap();

        assert!(pool.recv_result_timeout(Duration::from_millis(500)).is_none());
        assert!(!output.path().join(&id).exists());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_submit_does_not_block_when_queue_is_full() {
        let images = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let store = Arc::new(JobStore::new());
        let (release, gate) = bounded::<()>(0);
        let pool = WorkerPool::new(
            create_pipeline_with(images.path(), output.path(), Box::new(GateEncoder { gate })),
            Arc::clone(&store),
            1,
        )
        .unwrap();

        let first = movie_job();
        let first_id = store.insert(first.clone());
        pool.submit(first).unwrap();
        let picked_up = std::time::Instant::now();
        while pool.pending() > 0 && picked_up.elapsed() < Duration::from_secs(10) {
            thread::sleep(Duration::from_millis(10));
        }

        let started = std::time::Instant::now();
        let mut accepted = 0;
        let mut busy = 0;
        for _ in 0..10 {
            let job = movie_job();
            store.insert(job.clone());
            match pool.submit(job) {
                Ok(()) => accepted += 1,
                Err(WorkerError::QueueFull { capacity }) => {
                    assert_eq!(capacity, 2);
                    busy += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(accepted, 2);
        assert_eq!(busy, 8);

        drop(release);
        let result = pool.recv_result_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(result.job_id, first_id);

        pool.shutdown();
        pool.wait();
    }
}

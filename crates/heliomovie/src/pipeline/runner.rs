use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, warn};

use crate::compositor::{CompositeError, FrameCompositor, FrameGeometry, ImageSource};
use crate::encoder::{encode_all, EncodeSpec, FfmpegEncoder, VideoEncoder};
use crate::model::{LayerSet, RegionOfInterest};
use crate::sanitize;
use crate::sequencer::{FrameSchedule, FrameSequencer, FRAME_PATTERN};
use crate::storage::FileStorage;
use crate::worker::job::{CompletedMovie, JobResult, MovieJob};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};

/// A single still frame produced on demand.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub id: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub skipped_layers: Vec<u32>,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    compositor: FrameCompositor,
    encoder: Box<dyn VideoEncoder>,
    storage: FileStorage,
}

impl Pipeline {
    /// Production constructor, encoding with the configured ffmpeg binary.
    pub fn from_config(config: Arc<PipelineConfig>, source: Arc<dyn ImageSource>) -> Self {
        let encoder = Box::new(FfmpegEncoder::new(config.ffmpeg_path.clone()));
        Self::with_encoder(config, source, encoder)
    }

    /// Builds a pipeline around a specific encoder.
    pub fn with_encoder(
        config: Arc<PipelineConfig>,
        source: Arc<dyn ImageSource>,
        encoder: Box<dyn VideoEncoder>,
    ) -> Self {
        let compositor = FrameCompositor::new(source, config.search_tolerance);
        let storage = FileStorage::new(&config.output_directory);
        Self {
            config,
            compositor,
            encoder,
            storage,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Runs the whole movie pipeline for one job.
    pub fn run(&self, job: &MovieJob, progress: &dyn ProgressReporter) -> JobResult {
        let directory = self
            .storage
            .job_directory(&job.id, &job.request.basename());
        let mut ctx = PipelineContext::new(job.clone(), directory);

        let _pipeline_span = info_span!("pipeline",
            job_id = %job.id,
            layers = %job.request.layers,
            frames = job.request.num_frames,
        )
        .entered();

        progress.report(ProgressEvent::Processing);

        let movie = match self.execute(&mut ctx, progress) {
            Ok(movie) => movie,
            Err(e) => return self.fail(&mut ctx, e, progress),
        };

        for warning in &ctx.warnings {
            debug!("Pipeline warning: {:?}", warning);
        }

        let degraded = ctx
            .sequence
            .as_ref()
            .map(|s| s.degraded())
            .unwrap_or_default();
        info!(
            frames = movie.num_frames,
            degraded,
            containers = movie.output_paths.len(),
            "Movie completed"
        );

        progress.report(ProgressEvent::Completed(movie.clone()));
        JobResult::success(&ctx.job, &movie, degraded)
    }

    fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<CompletedMovie, PipelineError> {
        self.step_prepare(ctx)?;
        self.step_composite(ctx, progress)?;
        progress.report(ProgressEvent::Encoding);
        self.step_encode(ctx)?;
        progress.report(ProgressEvent::Finalizing);
        self.step_finalize(ctx)
    }

    fn fail(
        &self,
        ctx: &mut PipelineContext,
        err: PipelineError,
        progress: &dyn ProgressReporter,
    ) -> JobResult {
        error!(
            "Movie generation failed: {}",
            sanitize::strip_root(&err.to_string(), &self.config.output_directory)
        );

        if let Err(cleanup) = ctx.directory.discard_frames() {
            warn!("Failed to remove frames after error: {}", cleanup);
            ctx.warnings.push(PipelineWarning::CleanupFailed {
                error: cleanup.to_string(),
            });
        }

        let message = err.public_message();
        progress.report(ProgressEvent::Failed {
            error: message.clone(),
        });
        JobResult::failure(&ctx.job, message)
    }

    fn step_prepare(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let _step = info_span!("prepare").entered();

        // Regions resolved at submission come through unchanged.
        let roi = ctx.job.request.roi;
        let roi = RegionOfInterest::resolve(
            roi.top,
            roi.left,
            roi.bottom,
            roi.right,
            roi.image_scale,
            &self.config.frame_limits,
        )?;
        let geometry = FrameGeometry::from_roi(roi);
        debug!(width = geometry.width, height = geometry.height, "Resolved frame geometry");

        ctx.directory.create()?;
        ctx.geometry = Some(geometry);
        Ok(())
    }

    fn step_composite(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let _step = info_span!("composite").entered();
        let geometry = ctx.geometry.ok_or(CompositeError::EmptyGeometry)?;
        let request = &ctx.job.request;

        let schedule =
            FrameSchedule::new(request.start_time, request.num_frames, request.frame_rate)?;
        let sequencer = FrameSequencer::new(&self.compositor, self.config.min_viable_frames)
            .with_deadline(ctx.job.deadline(self.config.job_ceiling));

        let outcome = sequencer.run(
            schedule,
            &request.layers.visible(),
            &geometry,
            &ctx.directory.frames_dir(),
            |fraction| progress.report(ProgressEvent::Progress(fraction)),
        )?;

        if outcome.skipped > 0 {
            ctx.warnings.push(PipelineWarning::SkippedFrames {
                count: outcome.skipped,
            });
        }
        let degraded = outcome.degraded();
        if degraded > 0 {
            ctx.warnings
                .push(PipelineWarning::DegradedFrames { count: degraded });
        }

        ctx.sequence = Some(outcome);
        Ok(())
    }

    fn step_encode(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let _step = info_span!("encode").entered();
        let geometry = ctx.geometry.ok_or(CompositeError::EmptyGeometry)?;
        let frame_count = ctx.sequence.as_ref().map(|s| s.frames.len()).unwrap_or(0);

        let spec = EncodeSpec {
            frames_dir: ctx.directory.frames_dir(),
            frame_pattern: FRAME_PATTERN.to_string(),
            frame_count,
            frame_rate: ctx.job.request.frame_rate,
            width: geometry.width,
            height: geometry.height,
            output_dir: ctx.directory.root().to_path_buf(),
            basename: ctx.directory.basename().to_string(),
            primary_format: self.config.primary_format.clone(),
            deadline: Some(ctx.job.deadline(self.config.job_ceiling)),
        };

        ctx.outputs = encode_all(self.encoder.as_ref(), &spec, &self.config.derived_formats)?;
        Ok(())
    }

    fn step_finalize(&self, ctx: &mut PipelineContext) -> Result<CompletedMovie, PipelineError> {
        let _step = info_span!("finalize").entered();
        let geometry = ctx.geometry.ok_or(CompositeError::EmptyGeometry)?;
        let sequence = ctx.sequence.as_ref().ok_or(PipelineError::InsufficientData {
            viable: 0,
            required: self.config.min_viable_frames,
        })?;

        let thumbnail = ctx.directory.finalize(&sequence.frame_paths())?;
        debug!(thumbnail = %sanitize::redact_path(&thumbnail), "Kept thumbnail");

        let start_date = sequence
            .frames
            .first()
            .map(|f| f.timestamp)
            .unwrap_or(ctx.job.request.start_time);
        let end_date = sequence
            .frames
            .last()
            .map(|f| f.timestamp)
            .unwrap_or(start_date);

        ctx.thumbnail = Some(thumbnail.clone());
        Ok(CompletedMovie {
            frame_rate: ctx.job.request.frame_rate,
            num_frames: u32::try_from(sequence.frames.len()).unwrap_or(u32::MAX),
            start_date,
            end_date,
            width: geometry.width,
            height: geometry.height,
            thumbnail_path: thumbnail,
            output_paths: ctx.outputs.clone(),
        })
    }

    /// Composites a single frame for `date` into the screenshot directory.
    pub fn screenshot(
        &self,
        layers: &LayerSet,
        roi: RegionOfInterest,
        date: DateTime<Utc>,
    ) -> Result<Screenshot, PipelineError> {
        let _span = info_span!("screenshot", layers = %layers, date = %date).entered();

        let roi = RegionOfInterest::resolve(
            roi.top,
            roi.left,
            roi.bottom,
            roi.right,
            roi.image_scale,
            &self.config.frame_limits,
        )?;
        let geometry = FrameGeometry::from_roi(roi);

        let id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}_{}_{}.png",
            date.format("%Y_%m_%d_%H_%M_%S"),
            layers.to_filename_string(),
            &id[..8]
        );
        let path = self.storage.screenshot_directory()?.join(file_name);

        let frame = match self
            .compositor
            .composite(0, date, &layers.visible(), &geometry, &path)
        {
            Ok(frame) => frame,
            Err(CompositeError::NoLayers { .. }) => {
                return Err(PipelineError::InsufficientData {
                    viable: 0,
                    required: 1,
                })
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Screenshot {
            id,
            path,
            width: geometry.width,
            height: geometry.height,
            skipped_layers: frame.skipped_layers,
        })
    }
}

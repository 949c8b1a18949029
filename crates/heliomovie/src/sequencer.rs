//! Frame timestamps and the per-frame compositing loop.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::compositor::{CompositeError, Frame, FrameCompositor, FrameGeometry};
use crate::model::Layer;

/// File name of the `index`-th viable frame.
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:05}.png", index)
}

/// Pattern handed to the encoder, matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%05d.png";

/// Evenly spaced frame instants `start + i / frame_rate`, at microsecond
/// precision. Consumed once.
#[derive(Debug, Clone)]
pub struct FrameSchedule {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    num_frames: u32,
    frame_rate: f64,
    next: u32,
}

impl FrameSchedule {
    /// Fails when the rate is not a positive finite number or the last
    /// instant falls outside the representable date range.
    pub fn new(
        start: DateTime<Utc>,
        num_frames: u32,
        frame_rate: f64,
    ) -> Result<Self, SequenceError> {
        let out_of_range = SequenceError::OutOfRange {
            num_frames,
            frame_rate,
        };
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(out_of_range);
        }

        let mut schedule = Self {
            start,
            end: start,
            num_frames,
            frame_rate,
            next: 0,
        };
        schedule.end = schedule
            .at(num_frames.saturating_sub(1))
            .ok_or(out_of_range)?;
        Ok(schedule)
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    /// Instant of frame `index`, regardless of iteration state. `None` when
    /// the offset overflows.
    pub fn at(&self, index: u32) -> Option<DateTime<Utc>> {
        let micros = (f64::from(index) * 1_000_000.0 / self.frame_rate).round();
        if !micros.is_finite() || micros >= i64::MAX as f64 {
            return None;
        }
        self.start
            .checked_add_signed(chrono::Duration::microseconds(micros as i64))
    }

    /// Instant of the last frame.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

impl Iterator for FrameSchedule {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.num_frames {
            return None;
        }
        let instant = self.at(self.next)?;
        self.next += 1;
        Some(instant)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.num_frames - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameSchedule {}

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("only {viable} usable frames, at least {required} needed")]
    InsufficientData { viable: usize, required: usize },

    #[error("{num_frames} frames at {frame_rate} fps fall outside the supported date range")]
    OutOfRange { num_frames: u32, frame_rate: f64 },

    #[error("job deadline {deadline} passed while compositing")]
    Timeout { deadline: DateTime<Utc> },

    #[error(transparent)]
    Composite(#[from] CompositeError),
}

/// Frames written by a sequencer run.
#[derive(Debug)]
pub struct SequenceOutcome {
    pub frames: Vec<Frame>,
    /// Instants for which no layer had an image.
    pub skipped: usize,
}

impl SequenceOutcome {
    pub fn degraded(&self) -> usize {
        self.frames.iter().filter(|f| f.is_degraded()).count()
    }

    pub fn frame_paths(&self) -> Vec<PathBuf> {
        self.frames.iter().map(|f| f.composite_path.clone()).collect()
    }
}

/// Drives the compositor once per scheduled instant.
pub struct FrameSequencer<'a> {
    compositor: &'a FrameCompositor,
    min_viable_frames: usize,
    deadline: Option<DateTime<Utc>>,
}

impl<'a> FrameSequencer<'a> {
    pub fn new(compositor: &'a FrameCompositor, min_viable_frames: usize) -> Self {
        Self {
            compositor,
            min_viable_frames,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Composites every scheduled instant into `frames_dir`, numbering viable
    /// frames contiguously. `on_progress` receives `(i + 1) / n` after each
    /// attempt.
    pub fn run<F>(
        &self,
        schedule: FrameSchedule,
        layers: &[Layer],
        geometry: &FrameGeometry,
        frames_dir: &Path,
        mut on_progress: F,
    ) -> Result<SequenceOutcome, SequenceError>
    where
        F: FnMut(f64),
    {
        let total = schedule.len();
        if total < self.min_viable_frames {
            return Err(SequenceError::InsufficientData {
                viable: 0,
                required: self.min_viable_frames,
            });
        }

        let mut frames: Vec<Frame> = Vec::new();
        let mut skipped = 0;

        for (attempt, timestamp) in schedule.enumerate() {
            if let Some(deadline) = self.deadline {
                if Utc::now() > deadline {
                    return Err(SequenceError::Timeout { deadline });
                }
            }

            let out_path = frames_dir.join(frame_file_name(frames.len()));
            match self
                .compositor
                .composite(frames.len(), timestamp, layers, geometry, &out_path)
            {
                Ok(frame) => frames.push(frame),
                Err(CompositeError::NoLayers { .. }) => {
                    log::warn!("No images available for frame at {}, skipping", timestamp);
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }

            on_progress((attempt + 1) as f64 / total as f64);

            let remaining = total - attempt - 1;
            if frames.len() + remaining < self.min_viable_frames {
                return Err(SequenceError::InsufficientData {
                    viable: frames.len(),
                    required: self.min_viable_frames,
                });
            }
        }

        Ok(SequenceOutcome { frames, skipped })
    }
}

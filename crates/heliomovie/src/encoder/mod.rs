//! Video encoding of frame sequences into one or more containers.

pub mod ffmpeg;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use ffmpeg::FfmpegEncoder;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid encode settings: {0}")]
    InvalidSpec(String),

    #[error("failed to start encoder for {container}: {source}")]
    Spawn {
        container: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder for {container} exited with status {code:?}: {stderr}")]
    Failed {
        container: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("encoder for {container} was still running at the job deadline {deadline}")]
    TimedOut {
        container: String,
        deadline: DateTime<Utc>,
    },

    #[error("encoder for {container} produced no output file")]
    MissingOutput { container: String },

    #[error("encoder thread for {container} panicked")]
    Panicked { container: String },
}

impl EncodeError {
    pub fn container(&self) -> Option<&str> {
        match self {
            EncodeError::InvalidSpec(_) => None,
            EncodeError::Spawn { container, .. }
            | EncodeError::Failed { container, .. }
            | EncodeError::TimedOut { container, .. }
            | EncodeError::MissingOutput { container }
            | EncodeError::Panicked { container } => Some(container),
        }
    }
}

/// Everything needed to turn a directory of frames into a primary video.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    pub frames_dir: PathBuf,
    /// printf-style frame file pattern, e.g. `frame_%05d.png`.
    pub frame_pattern: String,
    pub frame_count: usize,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    pub output_dir: PathBuf,
    pub basename: String,
    pub primary_format: String,
    /// Encoders still running at this instant are stopped.
    pub deadline: Option<DateTime<Utc>>,
}

impl EncodeSpec {
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::InvalidSpec(
                "width/height must be non-zero".to_string(),
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(EncodeError::InvalidSpec(format!(
                "width/height must be even for yuv420p output, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(EncodeError::InvalidSpec(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.frame_count == 0 {
            return Err(EncodeError::InvalidSpec("no frames to encode".to_string()));
        }
        Ok(())
    }

    pub fn output_path(&self, format: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.basename, format))
    }

    pub fn primary_path(&self) -> PathBuf {
        self.output_path(&self.primary_format)
    }

    pub fn input_pattern(&self) -> PathBuf {
        self.frames_dir.join(&self.frame_pattern)
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn time_left(&self) -> Option<std::time::Duration> {
        self.deadline.map(|deadline| {
            (deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        })
    }
}

pub trait VideoEncoder: Send + Sync {
    /// Encodes the frames into the primary container. Returns its path.
    fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError>;

    /// Remuxes the primary video of `spec` into `format`, without
    /// re-encoding. Writes to `spec.output_path(format)`.
    fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError>;
}

/// Encodes the primary container, then every derived format concurrently.
///
/// Returns container format to path, including the primary.
pub fn encode_all(
    encoder: &dyn VideoEncoder,
    spec: &EncodeSpec,
    derived_formats: &[String],
) -> Result<BTreeMap<String, PathBuf>, EncodeError> {
    spec.validate()?;

    let primary = {
        let _span = tracing::info_span!("encode_primary", format = %spec.primary_format).entered();
        encoder.encode_primary(spec)?
    };
    ensure_output(&primary, &spec.primary_format)?;

    let mut outputs = BTreeMap::new();
    outputs.insert(spec.primary_format.clone(), primary.clone());

    let results: Vec<(String, Result<PathBuf, EncodeError>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = derived_formats
            .iter()
            .map(|format| {
                let handle = scope.spawn(move || {
                    let _span = tracing::info_span!("encode_derived", format = %format).entered();
                    encoder.derive(spec, format)
                });
                (format.clone(), handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(format, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(EncodeError::Panicked {
                        container: format.clone(),
                    })
                });
                (format, result)
            })
            .collect()
    });

    for (format, result) in results {
        let path = result?;
        ensure_output(&path, &format)?;
        outputs.insert(format, path);
    }

    Ok(outputs)
}

fn ensure_output(path: &Path, container: &str) -> Result<(), EncodeError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EncodeError::MissingOutput {
            container: container.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use tempfile::TempDir;

    struct TouchEncoder {
        derived_calls: AtomicUsize,
        fail_format: Option<String>,
    }

    impl VideoEncoder for TouchEncoder {
        fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
            let path = spec.primary_path();
            std::fs::write(&path, b"primary").unwrap();
            Ok(path)
        }

        fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
            self.derived_calls.fetch_add(1, Ordering::SeqCst);
            let output = spec.output_path(format);
            if self.fail_format.as_deref() == Some(format) {
                return Err(EncodeError::Failed {
                    container: format.to_string(),
                    code: Some(1),
                    stderr: "bad".to_string(),
                });
            }
            std::fs::write(&output, b"derived").unwrap();
            Ok(output)
        }
    }

    fn spec(dir: &Path) -> EncodeSpec {
        EncodeSpec {
            frames_dir: dir.join("frames"),
            frame_pattern: "frame_%05d.png".to_string(),
            frame_count: 3,
            frame_rate: 15.0,
            width: 640,
            height: 480,
            output_dir: dir.to_path_buf(),
            basename: "movie".to_string(),
            primary_format: "mp4".to_string(),
            deadline: None,
        }
    }

    #[test]
    fn test_time_left_saturates_at_zero() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec(dir.path());
        assert_eq!(spec.time_left(), None);

        spec.deadline = Some(Utc::now() - chrono::Duration::seconds(5));
        assert_eq!(spec.time_left(), Some(std::time::Duration::ZERO));

        spec.deadline = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(spec.time_left().unwrap() > std::time::Duration::from_secs(3500));
    }

    #[test]
    fn test_spec_validation() {
        let dir = TempDir::new().unwrap();
        let mut bad = spec(dir.path());
        bad.width = 641;
        assert!(matches!(bad.validate(), Err(EncodeError::InvalidSpec(_))));

        let mut bad = spec(dir.path());
        bad.frame_rate = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = spec(dir.path());
        bad.height = 0;
        assert!(bad.validate().is_err());

        assert!(spec(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_encode_all_produces_every_container() {
        let dir = TempDir::new().unwrap();
        let encoder = TouchEncoder {
            derived_calls: AtomicUsize::new(0),
            fail_format: None,
        };

        let outputs = encode_all(
            &encoder,
            &spec(dir.path()),
            &["mov".to_string(), "flv".to_string()],
        )
        .unwrap();

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs["mov"], dir.path().join("movie.mov"));
        assert!(outputs["flv"].exists());
        assert_eq!(encoder.derived_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_derived_failure_names_container() {
        let dir = TempDir::new().unwrap();
        let encoder = TouchEncoder {
            derived_calls: AtomicUsize::new(0),
            fail_format: Some("flv".to_string()),
        };

        let err = encode_all(
            &encoder,
            &spec(dir.path()),
            &["mov".to_string(), "flv".to_string()],
        )
        .unwrap_err();
        assert_eq!(err.container(), Some("flv"));
    }

    #[test]
    fn test_invalid_spec_never_reaches_encoder() {
        let dir = TempDir::new().unwrap();
        let encoder = TouchEncoder {
            derived_calls: AtomicUsize::new(0),
            fail_format: None,
        };
        let mut bad = spec(dir.path());
        bad.width = 3;

        assert!(encode_all(&encoder, &bad, &["mov".to_string()]).is_err());
        assert!(!dir.path().join("movie.mp4").exists());
    }
}

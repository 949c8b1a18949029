//! Test harness for isolated movie pipeline runs.
//!
//! The `TestHarness` owns a temporary directory with:
//! - `images/`: source images registered in an in-memory catalog
//! - `output/`: movie and screenshot output
//! - `config/`: config files written by tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;

use heliomovie::api::{MovieService, ServiceSettings, StatusResponse};
use heliomovie::compositor::{ImageRef, MemoryCatalog};
use heliomovie::config::Config;
use heliomovie::encoder::{EncodeError, EncodeSpec, VideoEncoder};
use heliomovie::pipeline::{Pipeline, PipelineConfig};

/// Side length of the synthetic disk images, in pixels.
pub const IMAGE_SIZE: u32 = 32;

/// Writes placeholder files instead of running ffmpeg.
pub struct TouchEncoder;

impl VideoEncoder for TouchEncoder {
    fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
        spec.validate()?;
        let path = spec.primary_path();
        std::fs::write(&path, format!("{} frames", spec.frame_count))
            .expect("Failed to write primary container");
        Ok(path)
    }

    fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
        let output = spec.output_path(format);
        std::fs::copy(spec.primary_path(), &output).expect("Failed to copy container");
        Ok(output)
    }
}

/// Fails the primary encode the way a crashing ffmpeg would.
pub struct FailingEncoder {
    pub code: i32,
}

impl VideoEncoder for FailingEncoder {
    fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
        Err(EncodeError::Failed {
            container: spec.primary_format.clone(),
            code: Some(self.code),
            stderr: format!("{}: Invalid data found", spec.input_pattern().display()),
        })
    }

    fn derive(&self, _spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
        Err(EncodeError::MissingOutput {
            container: format.to_string(),
        })
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_dir: PathBuf,
    catalog: Arc<MemoryCatalog>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let image_dir = base.join("images");
        let output_dir = base.join("output");
        let config_dir = base.join("config");

        std::fs::create_dir_all(&image_dir).expect("Failed to create image dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        Self {
            temp_dir,
            image_dir,
            output_dir,
            config_dir,
            catalog: Arc::new(MemoryCatalog::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn catalog(&self) -> Arc<MemoryCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Registers a uniformly coloured image for `source_id` at `date`.
    pub fn add_image(&self, source_id: u32, date: DateTime<Utc>, color: [u8; 4]) -> PathBuf {
        let path = self.image_dir.join(format!(
            "{}_{}.png",
            source_id,
            date.format("%Y%m%dT%H%M%S%.3f")
        ));
        RgbaImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgba(color))
            .save_with_format(&path, ImageFormat::Png)
            .expect("Failed to write source image");

        let centre = f64::from(IMAGE_SIZE) / 2.0;
        self.catalog.add(ImageRef {
            source_id,
            date,
            path: path.clone(),
            scale: 1.0,
            sun_center: (centre, centre),
        });
        path
    }

    /// Default configuration rooted at the harness output directory.
    pub fn config(&self) -> Config {
        let mut config = Config::with_output_directory(self.output_dir.display().to_string());
        config.worker_count = 2;
        config.public_base_url = "https://helio.example.org/cache".to_string();
        config
    }

    pub fn pipeline(&self, config: &Config, encoder: Box<dyn VideoEncoder>) -> Pipeline {
        Pipeline::with_encoder(
            Arc::new(PipelineConfig::from_config(config)),
            self.catalog(),
            encoder,
        )
    }

    pub fn service(&self, config: &Config, encoder: Box<dyn VideoEncoder>) -> MovieService {
        MovieService::new(
            self.pipeline(config, encoder),
            ServiceSettings::from_config(config),
        )
        .expect("Failed to start movie service")
    }

    pub fn write_config(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.config_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write config file");
        path
    }

    /// Polls the service until the movie reaches a terminal state.
    pub fn wait_terminal(&self, service: &MovieService, id: &str, token: &str) -> StatusResponse {
        for _ in 0..500 {
            let status = service
                .movie_status(id, token)
                .expect("Status query failed");
            if status.is_terminal() {
                return status;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("Movie {} did not reach a terminal state", id);
    }
}

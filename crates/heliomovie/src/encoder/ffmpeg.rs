use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tokio::io::AsyncReadExt;

use crate::encoder::{EncodeError, EncodeSpec, VideoEncoder};
use crate::sanitize::redact_path;

/// Upper bound on captured encoder diagnostics.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Encoder driving an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Whether the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn primary_command(&self, spec: &EncodeSpec) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-y", "-loglevel", "error", "-framerate"])
            .arg(spec.frame_rate.to_string())
            .arg("-i")
            .arg(spec.input_pattern())
            .args(["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-s"])
            .arg(format!("{}x{}", spec.width, spec.height))
            .args(["-movflags", "+faststart"])
            .arg(spec.primary_path());
        cmd
    }

    fn derive_command(&self, primary: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(primary)
            .args(["-c", "copy"])
            .arg(output);
        cmd
    }

    fn run(&self, cmd: Command, spec: &EncodeSpec, container: &str) -> Result<(), EncodeError> {
        let spawn_error = |source| EncodeError::Spawn {
            container: container.to_string(),
            source,
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(spawn_error)?;
        runtime.block_on(self.run_async(cmd, spec, container))
    }

    async fn run_async(&self, cmd: Command, spec: &EncodeSpec, container: &str) -> Result<(), EncodeError> {
        if let (Some(deadline), Some(left)) = (spec.deadline, spec.time_left()) {
            if left.is_zero() {
                return Err(EncodeError::TimedOut {
                    container: container.to_string(),
                    deadline,
                });
            }
        }

        let mut cmd = tokio::process::Command::from(cmd);
        // Dropping the child on timeout kills it.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| EncodeError::Spawn {
            container: container.to_string(),
            source: e,
        })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(stream) = stderr {
                let _ = stream.take(MAX_STDERR_BYTES).read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match (spec.deadline, spec.time_left()) {
            (Some(deadline), Some(left)) => {
                let waited = tokio::time::timeout(left, child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        let _ = child.kill().await;
                        stderr_task.abort();
                        tracing::warn!(container, %deadline, "Encoder stopped at job deadline");
                        return Err(EncodeError::TimedOut {
                            container: container.to_string(),
                            deadline,
                        });
                    }
                }
            }
            _ => child.wait().await,
        }
        .map_err(|e| EncodeError::Spawn {
            container: container.to_string(),
            source: e,
        })?;

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(EncodeError::Failed {
                container: container.to_string(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode_primary(&self, spec: &EncodeSpec) -> Result<PathBuf, EncodeError> {
        spec.validate()?;
        let output = spec.primary_path();

        tracing::info!(
            frames = spec.frame_count,
            width = spec.width,
            height = spec.height,
            file = %redact_path(&output),
            "Encoding primary video"
        );
        self.run(self.primary_command(spec), spec, &spec.primary_format)?;
        Ok(output)
    }

    fn derive(&self, spec: &EncodeSpec, format: &str) -> Result<PathBuf, EncodeError> {
        let output = spec.output_path(format);
        tracing::info!(format, file = %redact_path(&output), "Remuxing video");
        self.run(self.derive_command(&spec.primary_path(), &output), spec, format)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EncodeSpec {
        EncodeSpec {
            frames_dir: PathBuf::from("/jobs/abc/frames"),
            frame_pattern: "frame_%05d.png".to_string(),
            frame_count: 10,
            frame_rate: 15.0,
            width: 1920,
            height: 1080,
            output_dir: PathBuf::from("/jobs/abc"),
            basename: "2014_02_03_00_00_00_14".to_string(),
            primary_format: "mp4".to_string(),
            deadline: None,
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_primary_command_line() {
        let encoder = FfmpegEncoder::default();
        let cmd = encoder.primary_command(&spec());
        assert_eq!(cmd.get_program(), "ffmpeg");
        assert_eq!(
            args(&cmd),
            vec![
                "-y",
                "-loglevel",
                "error",
                "-framerate",
                "15",
                "-i",
                "/jobs/abc/frames/frame_%05d.png",
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-s",
                "1920x1080",
                "-movflags",
                "+faststart",
                "/jobs/abc/2014_02_03_00_00_00_14.mp4",
            ]
        );
    }

    #[test]
    fn test_derive_command_copies_stream() {
        let encoder = FfmpegEncoder::new("/opt/ffmpeg/bin/ffmpeg");
        let cmd = encoder.derive_command(Path::new("/jobs/abc/m.mp4"), Path::new("/jobs/abc/m.flv"));
        assert_eq!(cmd.get_program(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(
            args(&cmd),
            vec!["-y", "-loglevel", "error", "-i", "/jobs/abc/m.mp4", "-c", "copy", "/jobs/abc/m.flv"]
        );
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let encoder = FfmpegEncoder::new("/nonexistent/heliomovie-ffmpeg");
        assert!(!encoder.is_available());
        let err = encoder.derive(&spec(), "mov").unwrap_err();
        assert!(matches!(err, EncodeError::Spawn { ref container, .. } if container == "mov"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_failure() {
        let encoder = FfmpegEncoder::new("false");
        let err = encoder.derive(&spec(), "flv").unwrap_err();
        match err {
            EncodeError::Failed { container, code, .. } => {
                assert_eq!(container, "flv");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_spec_is_rejected_before_spawn() {
        let encoder = FfmpegEncoder::new("/nonexistent/heliomovie-ffmpeg");
        let mut bad = spec();
        bad.width = 1921;
        assert!(matches!(
            encoder.encode_primary(&bad),
            Err(EncodeError::InvalidSpec(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_encoder_is_killed_at_deadline() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let encoder = FfmpegEncoder::new(&script);
        let mut spec = spec();
        let deadline = chrono::Utc::now() + chrono::Duration::milliseconds(500);
        spec.deadline = Some(deadline);

        let started = Instant::now();
        let err = encoder.derive(&spec, "mov").unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            EncodeError::TimedOut { container, deadline: at } => {
                assert_eq!(container, "mov");
                assert_eq!(at, deadline);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_past_deadline_skips_spawn() {
        let encoder = FfmpegEncoder::new("/nonexistent/heliomovie-ffmpeg");
        let mut spec = spec();
        spec.deadline = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        assert!(matches!(
            encoder.derive(&spec, "flv"),
            Err(EncodeError::TimedOut { .. })
        ));
    }
}

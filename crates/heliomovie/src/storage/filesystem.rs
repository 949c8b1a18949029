use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StorageError;
use crate::sanitize::redact_path;
use crate::sequencer::frame_file_name;

const FRAMES_DIR: &str = "frames";
const SCREENSHOTS_DIR: &str = "screenshots";
const READY_MARKER: &str = "READY";

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails, which covers
/// cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Root of all generated movies and screenshots.
pub struct FileStorage {
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Directory layout of one movie job, `<output>/<id>/`.
    pub fn job_directory(&self, job_id: &str, basename: &str) -> JobDirectory {
        JobDirectory::new(self.output_directory.join(job_id), basename)
    }

    /// Creates and returns `<output>/screenshots/`.
    pub fn screenshot_directory(&self) -> Result<PathBuf, StorageError> {
        let dir = self.output_directory.join(SCREENSHOTS_DIR);
        ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Path of `path` relative to the output root, with `/` separators.
    /// `None` when the path lies outside the root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.output_directory).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

/// Files produced for one movie job.
#[derive(Debug, Clone)]
pub struct JobDirectory {
    root: PathBuf,
    basename: String,
}

impl JobDirectory {
    pub fn new(root: impl Into<PathBuf>, basename: &str) -> Self {
        Self {
            root: root.into(),
            basename: basename.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.frames_dir().join(frame_file_name(index))
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.container_path("png")
    }

    pub fn container_path(&self, format: &str) -> PathBuf {
        self.root.join(format!("{}.{}", self.basename, format))
    }

    pub fn ready_marker(&self) -> PathBuf {
        self.root.join(READY_MARKER)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_marker().is_file()
    }

    /// Creates the job and frame directories.
    pub fn create(&self) -> Result<(), StorageError> {
        ensure_directory(&self.root)?;
        ensure_directory(&self.frames_dir())
    }

    /// Keeps the first frame as the thumbnail, deletes every other frame and
    /// the frame directory, then writes the `READY` marker.
    pub fn finalize(&self, frames: &[PathBuf]) -> Result<PathBuf, StorageError> {
        let first = frames.first().ok_or(StorageError::NoFrames)?;
        let thumbnail = self.thumbnail_path();
        move_file(first, &thumbnail)?;

        for frame in frames.iter().skip(1) {
            remove_file_if_exists(frame)?;
        }
        self.discard_frames()?;

        let marker = self.ready_marker();
        std::fs::write(&marker, Utc::now().to_rfc3339()).map_err(|e| StorageError::WriteFile {
            path: marker.clone(),
            source: e,
        })?;

        log::debug!(
            "Finalized job directory, thumbnail {}",
            redact_path(&thumbnail)
        );
        Ok(thumbnail)
    }

    /// Deletes leftover frame files, then the emptied frame directory.
    /// Files the pipeline did not write are left in place and keep the
    /// directory.
    pub fn discard_frames(&self) -> Result<(), StorageError> {
        let frames_dir = self.frames_dir();
        if !frames_dir.exists() {
            return Ok(());
        }

        let pattern = format!(
            "{}/frame_*.png",
            glob::Pattern::escape(&frames_dir.to_string_lossy())
        );
        match glob::glob(&pattern) {
            Ok(paths) => {
                for path in paths.flatten() {
                    remove_file_if_exists(&path)?;
                }
            }
            Err(e) => log::warn!("Invalid frame cleanup pattern: {}", e),
        }

        std::fs::remove_dir(&frames_dir).map_err(|e| StorageError::Remove {
            path: frames_dir.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_frames(job: &JobDirectory, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = job.frame_path(i);
                std::fs::write(&path, format!("frame {}", i)).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_job_directory_layout() {
        let storage = FileStorage::new("/var/movies");
        let job = storage.job_directory("abc", "2014_02_03_00_00_00_14");

        assert_eq!(job.root(), Path::new("/var/movies/abc"));
        assert_eq!(
            job.frame_path(7),
            PathBuf::from("/var/movies/abc/frames/frame_00007.png")
        );
        assert_eq!(
            job.container_path("flv"),
            PathBuf::from("/var/movies/abc/2014_02_03_00_00_00_14.flv")
        );
        assert_eq!(
            job.thumbnail_path(),
            PathBuf::from("/var/movies/abc/2014_02_03_00_00_00_14.png")
        );
    }

    #[test]
    fn test_finalize_keeps_first_frame() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path());
        let job = storage.job_directory("job1", "movie");
        job.create().unwrap();
        let frames = write_frames(&job, 4);

        let thumbnail = job.finalize(&frames).unwrap();

        assert_eq!(thumbnail, job.thumbnail_path());
        assert_eq!(std::fs::read_to_string(&thumbnail).unwrap(), "frame 0");
        assert!(!job.frames_dir().exists());
        assert!(job.is_ready());
    }

    #[test]
    fn test_finalize_without_frames_fails() {
        let temp = TempDir::new().unwrap();
        let job = FileStorage::new(temp.path()).job_directory("job2", "movie");
        job.create().unwrap();
        assert!(matches!(job.finalize(&[]), Err(StorageError::NoFrames)));
        assert!(!job.is_ready());
    }

    #[test]
    fn test_discard_frames_removes_directory() {
        let temp = TempDir::new().unwrap();
        let job = FileStorage::new(temp.path()).job_directory("job3", "movie");
        job.create().unwrap();
        write_frames(&job, 3);

        job.discard_frames().unwrap();
        assert!(!job.frames_dir().exists());
        assert!(job.root().exists());
        // Second call is a no-op.
        job.discard_frames().unwrap();
    }

    #[test]
    fn test_discard_frames_escapes_directory_name() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("movies [2014]");
        let job = FileStorage::new(&root).job_directory("job4", "movie");
        job.create().unwrap();
        write_frames(&job, 2);

        job.discard_frames().unwrap();
        assert!(!job.frames_dir().exists());
    }

    #[test]
    fn test_discard_frames_keeps_foreign_files() {
        let temp = TempDir::new().unwrap();
        let job = FileStorage::new(temp.path()).job_directory("job5", "movie");
        job.create().unwrap();
        let frames = write_frames(&job, 2);
        let foreign = job.frames_dir().join("notes.txt");
        std::fs::write(&foreign, "keep").unwrap();

        assert!(matches!(
            job.discard_frames(),
            Err(StorageError::Remove { .. })
        ));
        assert!(frames.iter().all(|f| !f.exists()));
        assert!(foreign.exists());
    }

    #[test]
    fn test_relative_path() {
        let storage = FileStorage::new("/var/movies");
        assert_eq!(
            storage.relative_path(Path::new("/var/movies/abc/m.mp4")),
            Some("abc/m.mp4".to_string())
        );
        assert_eq!(storage.relative_path(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn test_move_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.png");
        let dst = temp.path().join("b.png");
        std::fs::write(&src, b"x").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert!(dst.exists());
    }
}

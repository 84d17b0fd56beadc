// SPDX-License-Identifier: GPL-3.0-only

//! External encoder invocation and movie promotion

use crate::errors::EncodeError;
use crate::storage;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything the encoder needs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    /// Run identifier scoping input frames and output name
    pub run_id: String,
    /// Directory the frames are staged in
    pub staging_dir: PathBuf,
    /// Glob, relative to `staging_dir`, matching only this run's frames
    pub input_pattern: String,
    /// Movie framerate
    pub framerate: u32,
    /// Hidden file the encoder writes to
    pub partial_output: PathBuf,
    /// Final movie location
    pub output: PathBuf,
}

impl EncodeJob {
    /// Build the job for `run_id`
    ///
    /// Output paths are made absolute because the encoder runs inside the
    /// staging directory.
    pub fn for_run(run_id: &str, staging_dir: &Path, output_dir: &Path, framerate: u32) -> Self {
        let output_dir = std::path::absolute(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());
        Self {
            run_id: run_id.to_string(),
            staging_dir: staging_dir.to_path_buf(),
            input_pattern: storage::frame_glob(run_id),
            framerate,
            partial_output: output_dir.join(storage::partial_movie_file_name(run_id)),
            output: output_dir.join(storage::movie_file_name(run_id)),
        }
    }
}

/// An external movie encoder
///
/// `encode` blocks until the encoder exits and must write only to
/// `job.partial_output`.
pub trait VideoEncoder: Send + Sync {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError>;
}

/// H.264/MP4 encoding through the `ffmpeg` command line tool
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    command: String,
}

impl FfmpegEncoder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Argument vector for `job`; never passed through a shell
    pub fn args(job: &EncodeJob) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-framerate".to_string(),
            job.framerate.to_string(),
            "-pattern_type".to_string(),
            "glob".to_string(),
            "-i".to_string(),
            job.input_pattern.clone(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            // the partial file has no recognizable extension
            "-f".to_string(),
            "mp4".to_string(),
            job.partial_output.display().to_string(),
        ]
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        let args = Self::args(job);
        debug!(command = %self.command, ?args, dir = %job.staging_dir.display(), "Invoking encoder");

        let output = Command::new(&self.command)
            .args(&args)
            .current_dir(&job.staging_dir)
            .output()
            .map_err(|source| EncodeError::Launch {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().lines().last().unwrap_or("").to_string(),
            });
        }

        Ok(())
    }
}

/// Render `job` and move the finished movie into place
///
/// On failure the partial file is removed, so nothing in the output
/// directory ever looks like a finished movie unless it is one.
pub async fn assemble(encoder: Arc<dyn VideoEncoder>, job: EncodeJob) -> Result<PathBuf, EncodeError> {
    if let Some(dir) = job.output.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(EncodeError::Promote)?;
    }

    info!(run_id = %job.run_id, pattern = %job.input_pattern, "Assembling timelapse movie");

    let encode_job = job.clone();
    let result = tokio::task::spawn_blocking(move || encoder.encode(&encode_job)).await?;

    if let Err(e) = result {
        error!(run_id = %job.run_id, error = %e, "Movie encoding failed");
        discard_partial(&job.partial_output).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&job.partial_output, &job.output).await {
        discard_partial(&job.partial_output).await;
        return Err(EncodeError::Promote(e));
    }

    info!(run_id = %job.run_id, movie = %job.output.display(), "Timelapse movie ready");
    Ok(job.output)
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial movie"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial movie"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WritingEncoder {
        fail: bool,
    }

    impl VideoEncoder for WritingEncoder {
        fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
            std::fs::write(&job.partial_output, b"movie").unwrap();
            if self.fail {
                return Err(EncodeError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn job(root: &Path) -> EncodeJob {
        EncodeJob::for_run("run1", &root.join("staging"), &root.join("out"), 24)
    }

    #[test]
    fn test_args_are_scoped_to_run() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let args = FfmpegEncoder::args(&job);
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(args[input + 1].starts_with("timelapse_run1_"));
        assert_eq!(args.last().unwrap(), &job.partial_output.display().to_string());
        assert!(job.partial_output.is_absolute());
        assert_ne!(job.partial_output, job.output);
    }

    #[tokio::test]
    async fn test_assemble_promotes_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let movie = assemble(Arc::new(WritingEncoder { fail: false }), job.clone())
            .await
            .unwrap();
        assert_eq!(movie, job.output);
        assert!(movie.exists());
        assert!(!job.partial_output.exists());
    }

    #[tokio::test]
    async fn test_assemble_discards_partial_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        let result = assemble(Arc::new(WritingEncoder { fail: true }), job.clone()).await;
        assert!(matches!(result, Err(EncodeError::Failed { .. })));
        assert!(!job.output.exists());
        assert!(!job.partial_output.exists());
    }

    #[test]
    fn test_missing_encoder_binary() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path());
        std::fs::create_dir_all(&job.staging_dir).unwrap();
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg");
        assert!(matches!(encoder.encode(&job), Err(EncodeError::Launch { .. })));
    }
}

//! Splitting the source into chunks.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::ffmpeg::{FfmpegCommand, ProcessMonitor};
use crate::pipeline::ProgressSink;
use crate::utils::fs::remove_file_if_exists;
use crate::workdir::WorkDir;
use crate::{Error, Result};

/// Progress label of the split phase.
pub const SPLIT_LABEL: &str = "split";

pub struct Segmenter {
    ffmpeg: FfmpegCommand,
    monitor: ProcessMonitor,
}

impl Segmenter {
    pub fn new(ffmpeg: FfmpegCommand, monitor: ProcessMonitor) -> Self {
        Self { ffmpeg, monitor }
    }

    /// A resumed run with chunks on disk is already split.
    pub async fn needs_split(workdir: &WorkDir, resume: bool) -> Result<bool> {
        if !resume {
            return Ok(true);
        }
        Ok(workdir.input_chunks().await?.is_empty())
    }

    /// Make sure `workdir` holds the chunks of `input` and return them in
    /// temporal order.
    pub async fn segment(
        &self,
        input: &Path,
        workdir: &WorkDir,
        resume: bool,
        segment_seconds: f64,
        split_args: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>> {
        if Self::needs_split(workdir, resume).await? {
            self.split(input, workdir, segment_seconds, split_args, sink)
                .await?;
        } else {
            info!("Input already split, skipping");
        }

        let chunks = workdir.input_chunks().await?;
        if chunks.is_empty() {
            return Err(Error::NoSegments(workdir.input_dir()));
        }
        Ok(chunks)
    }

    async fn split(
        &self,
        input: &Path,
        workdir: &WorkDir,
        segment_seconds: f64,
        split_args: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        info!(
            "Splitting {} into {}s chunks",
            input.display(),
            segment_seconds
        );

        let invocation =
            self.ffmpeg
                .split(input, &workdir.chunk_pattern(), segment_seconds, split_args);
        sink.task_started(SPLIT_LABEL, &crate::pipeline::file_label(input));
        let outcome = self
            .monitor
            .run(&invocation, |sample| sink.update(SPLIT_LABEL, sample))
            .await?;
        sink.task_finished(SPLIT_LABEL, &crate::pipeline::file_label(input), outcome.succeeded());

        if !outcome.succeeded() {
            // A partial split must not pass for a finished one on resume.
            discard_chunks(workdir).await?;
        }
        if outcome.stopped {
            return Err(Error::Cancelled);
        }
        if !outcome.succeeded() {
            return Err(Error::SplitFailed {
                exit_code: outcome.exit_code,
                diagnostics: outcome.diagnostics,
            });
        }

        debug!("Split finished in {:.1}s", outcome.elapsed.as_secs_f64());
        Ok(())
    }
}

async fn discard_chunks(workdir: &WorkDir) -> Result<()> {
    for chunk in workdir.input_chunks().await? {
        remove_file_if_exists(&chunk).await?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{FfmpegConfig, MonitorConfig};
    use crate::pipeline::NoopProgress;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Writes three chunks through the `%08d` pattern given as last argument.
    const FAKE_SPLIT: &str = r#"for a; do last=$a; done
for i in 0 1 2; do printf 'chunk %d' $i > "$(printf "$last" $i)"; done"#;

    fn segmenter(script: &str) -> Segmenter {
        let ffmpeg = FfmpegCommand::new(FfmpegConfig {
            binary: "sh".to_string(),
            prefix_args: vec!["-c".to_string(), script.to_string(), "fake".to_string()],
            hide_banner: false,
        });
        let monitor = ProcessMonitor::new(MonitorConfig::default(), CancellationToken::new());
        Segmenter::new(ffmpeg, monitor)
    }

    async fn workdir(temp: &TempDir) -> WorkDir {
        let dir = WorkDir::new(temp.path().join("work"));
        dir.prepare(true).await.unwrap();
        dir
    }

    #[tokio::test]
    async fn splits_into_sorted_chunks() {
        let temp = TempDir::new().unwrap();
        let dir = workdir(&temp).await;

        let chunks = segmenter(FAKE_SPLIT)
            .segment(Path::new("movie.mkv"), &dir, false, 10.0, &[], &NoopProgress)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], dir.input_dir().join("00000000.mkv"));
        assert_eq!(std::fs::read_to_string(&chunks[2]).unwrap(), "chunk 2");
    }

    #[tokio::test]
    async fn resume_skips_split_when_chunks_exist() {
        let temp = TempDir::new().unwrap();
        let dir = workdir(&temp).await;
        std::fs::write(dir.input_dir().join("00000000.mkv"), b"old").unwrap();

        assert!(!Segmenter::needs_split(&dir, true).await.unwrap());
        assert!(Segmenter::needs_split(&dir, false).await.unwrap());

        // Would fail if it ran.
        let chunks = segmenter("exit 1")
            .segment(Path::new("movie.mkv"), &dir, true, 10.0, &[], &NoopProgress)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(std::fs::read(&chunks[0]).unwrap(), b"old");
    }

    #[tokio::test]
    async fn failed_split_carries_diagnostics() {
        let temp = TempDir::new().unwrap();
        let dir = workdir(&temp).await;

        let err = segmenter("echo 'movie.mkv: No such file or directory' >&2; exit 1")
            .segment(Path::new("movie.mkv"), &dir, false, 10.0, &[], &NoopProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SplitFailed { exit_code: Some(1), .. }));
        assert_eq!(err.diagnostics(), Some("movie.mkv: No such file or directory\n"));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn failed_split_discards_partial_chunks() {
        let temp = TempDir::new().unwrap();
        let dir = workdir(&temp).await;
        let script = format!("{FAKE_SPLIT}\nexit 1");

        let err = segmenter(&script)
            .segment(Path::new("movie.mkv"), &dir, false, 10.0, &[], &NoopProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SplitFailed { .. }));
        assert!(dir.input_chunks().await.unwrap().is_empty());
        assert!(Segmenter::needs_split(&dir, true).await.unwrap());
    }

    #[tokio::test]
    async fn empty_split_is_an_error() {
        let temp = TempDir::new().unwrap();
        let dir = workdir(&temp).await;

        let err = segmenter("exit 0")
            .segment(Path::new("movie.mkv"), &dir, false, 10.0, &[], &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSegments(_)));
    }
}

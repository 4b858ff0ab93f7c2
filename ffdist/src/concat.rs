//! Merging encoded chunks into the final file.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ffmpeg::{FfmpegCommand, ProcessMonitor};
use crate::pipeline::ProgressSink;
use crate::utils::fs::{io_error, remove_file_if_exists};
use crate::workdir::WorkDir;
use crate::{Error, Result};

/// Progress label of the merge phase.
pub const MERGE_LABEL: &str = "merge";

/// Concat demuxer manifest for `chunks`, in file name order.
pub fn manifest_contents(chunks: &[PathBuf]) -> String {
    let mut sorted: Vec<&PathBuf> = chunks.iter().collect();
    sorted.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut manifest = String::new();
    for chunk in sorted {
        let path = chunk.to_string_lossy().replace('\'', r"'\''");
        manifest.push_str(&format!("file '{path}'\n"));
    }
    manifest
}

pub struct Concatenator {
    ffmpeg: FfmpegCommand,
    monitor: ProcessMonitor,
}

impl Concatenator {
    pub fn new(ffmpeg: FfmpegCommand, monitor: ProcessMonitor) -> Self {
        Self { ffmpeg, monitor }
    }

    /// Merge every encoded chunk of `workdir` into `output`, taking the
    /// non-video streams and metadata from `source`.
    ///
    /// Fails without running anything when a chunk has no output. The
    /// manifest is removed after a successful merge and left in place
    /// otherwise.
    pub async fn concat(
        &self,
        workdir: &WorkDir,
        source: &Path,
        output: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let missing = workdir.missing_outputs().await?;
        if !missing.is_empty() {
            return Err(Error::IncompleteOutput { missing });
        }

        let chunks = workdir.completed_outputs().await?;
        let manifest = workdir.manifest_path();
        tokio::fs::write(&manifest, manifest_contents(&chunks))
            .await
            .map_err(|e| io_error("writing merge manifest", &manifest, e))?;
        info!("Merging {} chunks into {}", chunks.len(), output.display());

        let invocation = self.ffmpeg.concat(&manifest, source, output);
        let label = crate::pipeline::file_label(output);
        sink.task_started(MERGE_LABEL, &label);
        let outcome = self
            .monitor
            .run(&invocation, |sample| sink.update(MERGE_LABEL, sample))
            .await?;
        sink.task_finished(MERGE_LABEL, &label, outcome.succeeded());

        if outcome.stopped {
            return Err(Error::Cancelled);
        }
        if !outcome.succeeded() {
            warn!("Merge failed, keeping {}", workdir.root().display());
            return Err(Error::MergeFailed {
                exit_code: outcome.exit_code,
                diagnostics: outcome.diagnostics,
            });
        }

        remove_file_if_exists(&manifest).await?;
        debug!("Merge finished in {:.1}s", outcome.elapsed.as_secs_f64());
        Ok(())
    }
}

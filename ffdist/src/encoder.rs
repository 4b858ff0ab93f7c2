//! One complete encode run: split, distribute, merge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::concat::Concatenator;
use crate::config::EncodeConfig;
use crate::ffmpeg::{FfmpegCommand, ProcessMonitor};
use crate::pipeline::{PoolReport, ProgressSink, TaskQueue, WorkerContext, WorkerPool};
use crate::segmenter::Segmenter;
use crate::utils::fs::absolute;
use crate::workdir::WorkDir;
use crate::{Error, Result};

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub output: PathBuf,
    pub work_dir: PathBuf,
    /// Chunks produced by the split.
    pub chunks: usize,
    /// Chunks that were already encoded when the run started.
    pub reused: usize,
    pub pool: PoolReport,
    pub work_dir_kept: bool,
    pub elapsed: Duration,
}

/// Encode `input` into `output` on the configured hosts.
///
/// Cancelling `cancel` stops the run at the next phase boundary, or inside
/// the running phase; the working directory is then left for a resume.
pub async fn encode(
    config: &EncodeConfig,
    input: &Path,
    output: &Path,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Result<EncodeReport> {
    config.validate()?;
    let started = Instant::now();

    let input = absolute(input)?;
    let output = absolute(output)?;
    let workdir = WorkDir::resolve(&input, config.work_dir.as_deref())?;
    workdir.prepare(config.resume).await?;

    let ffmpeg = FfmpegCommand::new(config.ffmpeg.clone());
    let monitor = ProcessMonitor::new(config.monitor, cancel.clone());

    let segmenter = Segmenter::new(ffmpeg.clone(), monitor.clone());
    let chunks = segmenter
        .segment(
            &input,
            &workdir,
            config.resume,
            config.segment_seconds,
            &config.split_args,
            sink.as_ref(),
        )
        .await?;

    let tasks = workdir.pending_tasks(&config.transcode_args).await?;
    let reused = chunks.len().saturating_sub(tasks.len());
    if reused > 0 {
        info!("{} of {} chunks already encoded", reused, chunks.len());
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let ctx = WorkerContext {
        queue: Arc::new(tasks.into_iter().collect::<TaskQueue>()),
        ffmpeg: ffmpeg.clone(),
        shell: config.remote.shell(),
        monitor: config.monitor,
        sink: sink.clone(),
    };
    let pool = WorkerPool::new(config.hosts.clone(), ctx).run(&cancel).await;

    if !pool.panicked.is_empty() {
        return Err(Error::WorkerPanicked {
            hosts: pool.panicked,
        });
    }
    if pool.cancelled {
        warn!(
            "Cancelled, keeping {} for a resumed run",
            workdir.root().display()
        );
        return Err(Error::Cancelled);
    }

    Concatenator::new(ffmpeg, monitor)
        .concat(&workdir, &input, &output, sink.as_ref())
        .await?;

    if config.keep_work_dir {
        info!("Keeping {}", workdir.root().display());
    } else {
        workdir.remove().await?;
    }

    let report = EncodeReport {
        output,
        work_dir: workdir.root().to_path_buf(),
        chunks: chunks.len(),
        reused,
        pool,
        work_dir_kept: config.keep_work_dir,
        elapsed: started.elapsed(),
    };
    info!(
        "Encoded {} chunks into {} in {:.1}s",
        report.chunks,
        report.output.display(),
        report.elapsed.as_secs_f64()
    );
    Ok(report)
}

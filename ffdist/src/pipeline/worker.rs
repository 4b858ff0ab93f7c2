use std::path::{Path, PathBuf};
use std::sync::Arc;

use process_utils::RemoteShell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::ProgressSink;
use super::task::{Host, Task};
use super::task_queue::TaskQueue;
use crate::config::MonitorConfig;
use crate::ffmpeg::{FfmpegCommand, Invocation, ProcessMonitor};
use crate::utils::fs::remove_file_if_exists;

/// Everything the workers of one pool share.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub ffmpeg: FfmpegCommand,
    pub shell: RemoteShell,
    pub monitor: MonitorConfig,
    pub sink: Arc<dyn ProgressSink>,
}

/// Counters of one worker's run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
    /// The worker left its loop because of a stop request.
    pub stopped: bool,
}

/// Processes tasks on one host, one at a time, until the queue is empty or
/// a stop is requested.
pub struct Worker {
    host: Host,
    ctx: WorkerContext,
    monitor: ProcessMonitor,
}

impl Worker {
    pub fn new(host: Host, ctx: WorkerContext, stop: CancellationToken) -> Self {
        let monitor = ProcessMonitor::new(ctx.monitor, stop);
        Self { host, ctx, monitor }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    fn is_stopped(&self) -> bool {
        self.monitor.stop_token().is_cancelled()
    }

    /// The transform of `task` as it runs on this worker's host.
    pub fn invocation(&self, task: &Task) -> Invocation {
        let invocation =
            self.ctx
                .ffmpeg
                .transform(&task.input_path, &task.output_path, &task.extra_args);
        if self.host.is_local() {
            invocation
        } else {
            invocation.remote(&self.ctx.shell, &self.host.name, &self.host.transport_args)
        }
    }

    pub async fn run(self) -> WorkerStats {
        let label = self.host.name.as_str();
        let mut stats = WorkerStats::default();
        debug!(host = label, "Worker started");

        loop {
            if self.is_stopped() {
                stats.stopped = true;
                break;
            }

            let Some(task) = self.ctx.queue.try_take() else {
                break;
            };
            let chunk = task.chunk_name();
            self.ctx.sink.task_started(label, &chunk);

            let invocation = self.invocation(&task);
            let mut output = OutputGuard::new(&task.output_path);
            let sink = &self.ctx.sink;
            let result = self
                .monitor
                .run(&invocation, |sample| sink.update(label, sample))
                .await;

            let (exit_code, diagnostics) = match result {
                Ok(outcome) if outcome.succeeded() => {
                    output.keep();
                    stats.completed += 1;
                    sink.task_finished(label, &chunk, true);
                    debug!(host = label, chunk = %chunk, elapsed = ?outcome.elapsed, "Chunk done");
                    continue;
                }
                Ok(outcome) => (outcome.exit_code, outcome.diagnostics),
                Err(e) => (None, e.to_string()),
            };

            stats.failed += 1;
            output.keep();
            self.recover(task, &chunk, exit_code, &diagnostics).await;

            if self.is_stopped() {
                stats.stopped = true;
                break;
            }
            self.pause_after_failure().await;
        }

        info!(
            host = label,
            completed = stats.completed,
            failed = stats.failed,
            stopped = stats.stopped,
            "Worker finished"
        );
        stats
    }

    /// Delete the partial output, report the failure and re-queue the task.
    async fn recover(&self, task: Task, chunk: &str, exit_code: Option<i32>, diagnostics: &str) {
        let label = self.host.name.as_str();

        match remove_file_if_exists(&task.output_path).await {
            Ok(removed) => debug!(host = label, chunk, removed, "Partial output cleaned up"),
            Err(e) => error!(host = label, chunk, "Failed to remove partial output: {}", e),
        }

        if self.is_stopped() {
            info!(host = label, chunk, "Chunk interrupted, returned to the queue");
        } else {
            warn!(host = label, chunk, exit_code = ?exit_code, "Chunk failed, re-queuing");
            if !diagnostics.is_empty() {
                debug!(host = label, chunk, "Diagnostics:\n{}", diagnostics.trim_end());
            }
            self.ctx.sink.task_failed(label, chunk, diagnostics);
        }
        self.ctx.sink.task_finished(label, chunk, false);

        self.ctx.queue.put(task);
    }

    /// Wait one poll interval before taking the next task so that a host
    /// that cannot run anything does not spin.
    async fn pause_after_failure(&self) {
        tokio::select! {
            _ = self.monitor.stop_token().cancelled() => {}
            _ = tokio::time::sleep(self.ctx.monitor.poll_interval()) => {}
        }
    }
}

/// Deletes a task's output file when dropped before the attempt settled,
/// e.g. while unwinding from a panic inside the attempt.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// The attempt settled; the file is the caller's responsibility again.
    fn keep(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!("Removed unsettled output {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(
                "Failed to remove unsettled output {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::FfmpegConfig;
    use crate::ffmpeg::ProgressSample;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn update(&self, _label: &str, _sample: &ProgressSample) {}

        fn task_started(&self, label: &str, chunk: &str) {
            self.events.lock().push(format!("start {label} {chunk}"));
        }

        fn task_finished(&self, label: &str, chunk: &str, ok: bool) {
            self.events.lock().push(format!("finish {label} {chunk} {ok}"));
        }

        fn task_failed(&self, label: &str, chunk: &str, _diagnostics: &str) {
            self.events.lock().push(format!("fail {label} {chunk}"));
        }
    }

    /// A stand-in transform: `sh -c <script> fake <generated args...>`.
    fn fake_ffmpeg(script: &str) -> FfmpegCommand {
        FfmpegCommand::new(FfmpegConfig {
            binary: "sh".to_string(),
            prefix_args: vec!["-c".to_string(), script.to_string(), "fake".to_string()],
            hide_banner: false,
        })
    }

    /// A stand-in remote shell that runs its last argument locally.
    fn fake_ssh() -> RemoteShell {
        RemoteShell::new("sh").with_args([
            "-c",
            r#"for a; do last=$a; done; exec sh -c "$last""#,
            "ssh",
        ])
    }

    fn context(dir: &Path, chunks: usize, script: &str, sink: Arc<dyn ProgressSink>) -> WorkerContext {
        std::fs::create_dir_all(dir.join("in")).unwrap();
        std::fs::create_dir_all(dir.join("out")).unwrap();
        let queue: TaskQueue = (0..chunks)
            .map(|i| {
                let name = format!("{i:08}.mkv");
                let input = dir.join("in").join(&name);
                std::fs::write(&input, format!("chunk {i}")).unwrap();
                Task::new(input, dir.join("out").join(&name), Vec::new())
            })
            .collect();

        WorkerContext {
            queue: Arc::new(queue),
            ffmpeg: fake_ffmpeg(script),
            shell: fake_ssh(),
            monitor: MonitorConfig {
                poll_interval_ms: 20,
                reap_grace_ms: 500,
            },
            sink,
        }
    }

    #[test]
    fn test_remote_invocation_wraps_transform() {
        let ctx = WorkerContext {
            queue: Arc::new(TaskQueue::new()),
            ffmpeg: FfmpegCommand::new(FfmpegConfig::default()),
            shell: RemoteShell::default(),
            monitor: MonitorConfig::default(),
            sink: Arc::new(crate::pipeline::NoopProgress),
        };
        let task = Task::new("/w/in/a.mkv", "/w/out/a.mkv", vec!["-crf".into(), "23".into()]);

        let local = Worker::new(Host::new("localhost"), ctx.clone(), CancellationToken::new());
        assert_eq!(local.invocation(&task).program(), "ffmpeg");

        let remote = Worker::new(
            Host::new("box2").with_transport_args(["-p", "2222"]),
            ctx,
            CancellationToken::new(),
        );
        let inv = remote.invocation(&task);
        assert_eq!(inv.program(), "ssh");
        assert_eq!(inv.args()[..3], ["-p", "2222", "box2"]);
        assert!(inv.args()[3].starts_with("ffmpeg -hide_banner -f matroska -i pipe: -crf 23"));
    }

    #[tokio::test]
    async fn completes_every_task_locally() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let ctx = context(temp.path(), 3, "cat", sink.clone());
        let queue = ctx.queue.clone();

        let stats = Worker::new(Host::new("localhost"), ctx, CancellationToken::new())
            .run()
            .await;

        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 0);
        assert!(!stats.stopped);
        assert!(queue.is_empty());
        for i in 0..3 {
            let out = temp.path().join("out").join(format!("{i:08}.mkv"));
            assert_eq!(std::fs::read_to_string(out).unwrap(), format!("chunk {i}"));
        }
        assert_eq!(
            sink.events.lock().first().map(String::as_str),
            Some("start localhost 00000000.mkv")
        );
    }

    #[tokio::test]
    async fn completes_through_remote_shell() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), 2, "cat", Arc::new(crate::pipeline::NoopProgress));

        let stats = Worker::new(
            Host::new("encoder@box2").with_transport_args(["-p", "2222"]),
            ctx,
            CancellationToken::new(),
        )
        .run()
        .await;

        assert_eq!(stats.completed, 2);
        let out = temp.path().join("out").join("00000001.mkv");
        assert_eq!(std::fs::read_to_string(out).unwrap(), "chunk 1");
    }

    #[tokio::test]
    async fn failing_task_is_cleaned_and_requeued_until_stopped() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(RecordingSink::default());
        // Writes a partial file, then fails.
        let ctx = context(temp.path(), 1, "cat; echo 'Conversion failed!' >&2; exit 1", sink.clone());
        let queue = ctx.queue.clone();

        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let stats = Worker::new(Host::new("localhost"), ctx, stop).run().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(stats.stopped);
        assert!(stats.failed >= 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(queue.len(), 1);
        assert!(!temp.path().join("out").join("00000000.mkv").exists());
        assert!(
            sink.events
                .lock()
                .iter()
                .any(|e| e == "fail localhost 00000000.mkv")
        );
    }

    #[tokio::test]
    async fn stop_interrupts_running_task() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), 2, "cat; sleep 30", Arc::new(crate::pipeline::NoopProgress));
        let queue = ctx.queue.clone();

        let stop = CancellationToken::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let stats = Worker::new(Host::new("localhost"), ctx, stop).run().await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(stats.stopped);
        assert_eq!(stats.completed, 0);
        assert_eq!(queue.len(), 2);
        assert!(!temp.path().join("out").join("00000000.mkv").exists());
    }
}

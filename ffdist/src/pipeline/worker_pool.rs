use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::task::Host;
use super::worker::{Worker, WorkerContext, WorkerStats};

/// Result of one pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    /// Per-host counters, in host order.
    pub workers: Vec<(String, WorkerStats)>,
    /// The run ended because of a stop request.
    pub cancelled: bool,
    /// Hosts whose worker panicked. The other workers were stopped.
    pub panicked: Vec<String>,
    pub elapsed: Duration,
}

impl PoolReport {
    pub fn completed(&self) -> usize {
        self.workers.iter().map(|(_, s)| s.completed).sum()
    }

    pub fn failed(&self) -> usize {
        self.workers.iter().map(|(_, s)| s.failed).sum()
    }
}

/// Runs one worker per host over a shared queue.
pub struct WorkerPool {
    hosts: Vec<Host>,
    ctx: WorkerContext,
}

impl WorkerPool {
    pub fn new(hosts: Vec<Host>, ctx: WorkerContext) -> Self {
        Self { hosts, ctx }
    }

    /// Start every worker and wait until all of them have left their loop.
    ///
    /// Cancelling `cancel` stops every worker and its running invocation;
    /// this still waits for all of them before returning. A panicking worker
    /// stops the others the same way and is listed in
    /// [`PoolReport::panicked`].
    pub async fn run(self, cancel: &CancellationToken) -> PoolReport {
        let started = Instant::now();
        info!(
            "Starting {} worker(s) for {} chunk(s)",
            self.hosts.len(),
            self.ctx.queue.len()
        );

        let stop = cancel.child_token();
        let mut join_set = JoinSet::new();
        for (index, host) in self.hosts.iter().enumerate() {
            let worker = Worker::new(host.clone(), self.ctx.clone(), stop.child_token());
            join_set.spawn(async move { (index, worker.run().await) });
        }

        let mut finished: Vec<Option<WorkerStats>> = vec![None; self.hosts.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, stats)) => finished[index] = Some(stats),
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    stop.cancel();
                }
            }
        }

        let mut workers = Vec::with_capacity(self.hosts.len());
        let mut panicked = Vec::new();
        for (host, stats) in self.hosts.iter().zip(finished) {
            match stats {
                Some(stats) => workers.push((host.name.clone(), stats)),
                None => {
                    panicked.push(host.name.clone());
                    workers.push((host.name.clone(), WorkerStats::default()));
                }
            }
        }

        let report = PoolReport {
            workers,
            cancelled: cancel.is_cancelled(),
            panicked,
            elapsed: started.elapsed(),
        };
        info!(
            completed = report.completed(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "Worker pool finished in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        report
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{FfmpegConfig, MonitorConfig};
    use crate::ffmpeg::{FfmpegCommand, ProgressSample};
    use crate::pipeline::{NoopProgress, ProgressSink, Task, TaskQueue};
    use process_utils::RemoteShell;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &Path, chunks: usize, script: &str) -> WorkerContext {
        std::fs::create_dir_all(dir.join("out")).unwrap();
        let queue: TaskQueue = (0..chunks)
            .map(|i| {
                let input = dir.join(format!("{i:08}.in"));
                std::fs::write(&input, format!("chunk {i}")).unwrap();
                Task::new(input, dir.join("out").join(format!("{i:08}.mkv")), Vec::new())
            })
            .collect();

        WorkerContext {
            queue: Arc::new(queue),
            ffmpeg: FfmpegCommand::new(FfmpegConfig {
                binary: "sh".to_string(),
                prefix_args: vec!["-c".to_string(), script.to_string(), "fake".to_string()],
                hide_banner: false,
            }),
            shell: RemoteShell::new("sh").with_args([
                "-c",
                r#"for a; do last=$a; done; exec sh -c "$last""#,
                "ssh",
            ]),
            monitor: MonitorConfig {
                poll_interval_ms: 20,
                reap_grace_ms: 500,
            },
            sink: Arc::new(NoopProgress),
        }
    }

    #[tokio::test]
    async fn drains_queue_across_hosts() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), 12, "cat");
        let queue = ctx.queue.clone();
        let hosts = vec![Host::new("localhost"), Host::new("box1"), Host::new("box2")];

        let report = WorkerPool::new(hosts, ctx)
            .run(&CancellationToken::new())
            .await;

        assert!(!report.cancelled);
        assert_eq!(report.completed(), 12);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.workers.len(), 3);
        assert_eq!(report.workers[0].0, "localhost");
        assert!(queue.is_empty());
        for i in 0..12 {
            assert!(temp.path().join("out").join(format!("{i:08}.mkv")).exists());
        }
    }

    #[tokio::test]
    async fn cancel_stops_every_worker() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path(), 6, "cat; sleep 30");
        let queue = ctx.queue.clone();
        let hosts = vec![Host::new("localhost"), Host::new("box1")];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let report = WorkerPool::new(hosts, ctx).run(&cancel).await;

        assert!(report.cancelled);
        assert!(report.elapsed < Duration::from_secs(5));
        assert_eq!(report.completed(), 0);
        assert!(report.workers.iter().all(|(_, s)| s.stopped));
        // Interrupted tasks went back into the queue.
        assert_eq!(queue.len(), 6);
        assert_eq!(std::fs::read_dir(temp.path().join("out")).unwrap().count(), 0);
    }

    struct PanickingSink;

    impl ProgressSink for PanickingSink {
        fn update(&self, label: &str, _sample: &ProgressSample) {
            if label == "box1" {
                panic!("progress display broke");
            }
        }
    }

    #[tokio::test]
    async fn panicking_worker_stops_the_pool_and_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let script = "cat; echo 'frame=1 fps=1 q=0 size=1kB time=00:00:01.00 bitrate=1kbits/s speed=1x' >&2; sleep 1";
        let mut ctx = context(temp.path(), 4, script);
        ctx.sink = Arc::new(PanickingSink);
        let hosts = vec![Host::new("localhost"), Host::new("box1")];

        let report = WorkerPool::new(hosts, ctx).run(&CancellationToken::new()).await;

        assert_eq!(report.panicked, vec!["box1"]);
        assert!(!report.cancelled);
        assert!(report.elapsed < Duration::from_secs(10));
        // The panicking worker's chunk and the chunk the other worker was
        // stopped in are both gone; nothing partial is left behind.
        assert!(report.workers[0].1.stopped);
        assert_eq!(report.completed(), 0);
        assert_eq!(std::fs::read_dir(temp.path().join("out")).unwrap().count(), 0);
    }
}

//! Supervision of one ffmpeg child process.
//!
//! The monitor owns the child for its whole life: it spawns it, follows the
//! diagnostic stream, forwards progress, honours a stop request within one
//! poll interval, and reaps the child within a bounded grace period.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::command::Invocation;
use super::parser::{DiagnosticLine, parse_line};
use super::record_reader::RecordReader;
use crate::config::MonitorConfig;
use crate::{Error, Result};

/// Diagnostic text kept per run. Older lines are dropped first.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// One progress observation of a running child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub frame: u64,
    pub fps: f64,
    /// Elapsed media time in seconds.
    pub position: f64,
    /// Nominal duration in seconds, `None` until the stream announced it.
    pub total: Option<f64>,
    pub speed: f64,
}

impl ProgressSample {
    /// Completion in percent, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0.0 => Some((self.position / total * 100.0).clamp(0.0, 100.0)),
            _ => None,
        }
    }

    /// Estimated seconds of wall-clock time left.
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total?;
        if self.speed <= 0.0 {
            return None;
        }
        Some(((total - self.position) / self.speed).max(0.0))
    }
}

/// Terminal result of one supervised run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    /// `None` when the child was killed by a signal or never reaped.
    pub exit_code: Option<i32>,
    /// The run was interrupted by a stop request.
    pub stopped: bool,
    /// Diagnostic records that were neither duration nor progress.
    pub diagnostics: String,
    pub last_progress: Option<ProgressSample>,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.stopped
    }
}

/// Accumulates what the diagnostic stream told us.
#[derive(Debug, Default)]
struct StreamState {
    total: Option<f64>,
    last_progress: Option<ProgressSample>,
    diagnostics: String,
}

impl StreamState {
    fn consume<F>(&mut self, record: &str, on_progress: &mut F)
    where
        F: FnMut(&ProgressSample),
    {
        match parse_line(record) {
            DiagnosticLine::Duration(secs) => {
                if self.total.is_none() {
                    self.total = Some(secs);
                }
            }
            DiagnosticLine::Progress(line) => {
                let sample = ProgressSample {
                    frame: line.frame,
                    fps: line.fps,
                    position: line.time_secs,
                    total: self.total,
                    speed: line.speed,
                };
                on_progress(&sample);
                self.last_progress = Some(sample);
            }
            DiagnosticLine::Other(text) => {
                trace!(target: "ffdist::ffmpeg::stderr", "{}", text);
                self.push_diagnostic(text);
            }
        }
    }

    fn push_diagnostic(&mut self, text: &str) {
        self.diagnostics.push_str(text);
        self.diagnostics.push('\n');

        if self.diagnostics.len() > MAX_DIAGNOSTIC_BYTES {
            let excess = self.diagnostics.len() - MAX_DIAGNOSTIC_BYTES;
            // Cut after a newline so the kept text starts on a char boundary.
            let cut = self.diagnostics.as_bytes()[excess..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| excess + i + 1)
                .unwrap_or(self.diagnostics.len());
            self.diagnostics.drain(..cut);
        }
    }
}

/// Runs invocations under a stop token.
#[derive(Debug, Clone)]
pub struct ProcessMonitor {
    config: MonitorConfig,
    stop: CancellationToken,
}

impl ProcessMonitor {
    pub fn new(config: MonitorConfig, stop: CancellationToken) -> Self {
        Self { config, stop }
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Spawn `invocation` and supervise it to the end.
    ///
    /// `on_progress` is called from this task for every progress record; it
    /// must not block. Only spawning errors are returned as `Err`: a failing
    /// or stopped child is reported through the outcome.
    pub async fn run<F>(&self, invocation: &Invocation, mut on_progress: F) -> Result<ProcessOutcome>
    where
        F: FnMut(&ProgressSample) + Send,
    {
        debug!("Running: {}", invocation.command_line());
        let started = Instant::now();

        let mut child = invocation
            .to_command()?
            .spawn()
            .map_err(|e| Error::spawn(invocation.program(), e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::spawn(invocation.program(), std::io::Error::other("stderr not captured")))?;
        let mut records = RecordReader::new(stderr);

        let mut state = StreamState::default();
        let mut status: Option<ExitStatus> = None;
        let mut stream_open = true;
        let mut stopped = false;

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while status.is_none() {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    stopped = true;
                    break;
                }
                exit = child.wait() => {
                    match exit {
                        Ok(exit) => status = Some(exit),
                        Err(e) => {
                            warn!("Error waiting for {}: {}", invocation.program(), e);
                            break;
                        }
                    }
                }
                record = records.next_record(), if stream_open => {
                    match record {
                        Ok(Some(line)) => state.consume(&line, &mut on_progress),
                        Ok(None) => stream_open = false,
                        Err(e) => {
                            warn!("Error reading {} diagnostics: {}", invocation.program(), e);
                            stream_open = false;
                        }
                    }
                }
                // Bounded wake-up even when the child is silent.
                _ = ticker.tick() => {}
            }
        }

        let grace = self.config.reap_grace();

        if stopped {
            if let Err(e) = child.start_kill() {
                debug!("Kill request for {} failed: {}", invocation.program(), e);
            }
            status = reap(&mut child, grace).await;
        } else {
            if stream_open {
                drain(&mut records, &mut state, &mut on_progress, grace).await;
            }
            if status.is_none() {
                status = reap(&mut child, grace).await;
            }
        }

        let outcome = ProcessOutcome {
            exit_code: status.and_then(|s| s.code()),
            stopped,
            diagnostics: state.diagnostics,
            last_progress: state.last_progress,
            elapsed: started.elapsed(),
        };

        debug!(
            program = invocation.program(),
            exit_code = ?outcome.exit_code,
            stopped = outcome.stopped,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Process finished"
        );

        Ok(outcome)
    }
}

/// Wait for the child within `grace`. On timeout the child is left to
/// `kill_on_drop`.
async fn reap(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!("Error reaping child process: {}", e);
            None
        }
        Err(_) => {
            warn!("Child process did not exit within {:?}, abandoning it", grace);
            None
        }
    }
}

/// Collect what is still buffered on the diagnostic stream after exit.
async fn drain<R, F>(
    records: &mut RecordReader<R>,
    state: &mut StreamState,
    on_progress: &mut F,
    grace: Duration,
) where
    R: tokio::io::AsyncRead + Unpin,
    F: FnMut(&ProgressSample),
{
    let collect = async {
        while let Ok(Some(line)) = records.next_record().await {
            state.consume(&line, on_progress);
        }
    };
    if tokio::time::timeout(grace, collect).await.is_err() {
        debug!("Diagnostic stream still open {:?} after exit", grace);
    }
}

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::ffmpeg::ProgressSample;

/// Receives progress of every running invocation.
///
/// `label` identifies the producer: a host name for workers, `split` and
/// `merge` for the two fixed phases. Implementations are called from worker
/// tasks and must return quickly. Updates may arrive at any rate and may
/// repeat, so only the last value per label matters.
pub trait ProgressSink: Send + Sync {
    fn update(&self, label: &str, sample: &ProgressSample);

    fn task_started(&self, _label: &str, _chunk: &str) {}

    fn task_finished(&self, _label: &str, _chunk: &str, _ok: bool) {}

    /// Error channel for recoverable task failures.
    fn task_failed(&self, _label: &str, _chunk: &str, _diagnostics: &str) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn update(&self, _label: &str, _sample: &ProgressSample) {}
}

/// Logs progress at debug level, at most once per interval and label.
#[derive(Debug)]
pub struct TracingProgress {
    interval: Duration,
    last_logged: Mutex<HashMap<String, Instant>>,
}

impl TracingProgress {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: Mutex::new(HashMap::new()),
        }
    }

    fn should_log(&self, label: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last_logged.lock();
        match last.get_mut(label) {
            Some(at) if now.duration_since(*at) < self.interval => false,
            Some(at) => {
                *at = now;
                true
            }
            None => {
                last.insert(label.to_string(), now);
                true
            }
        }
    }
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ProgressSink for TracingProgress {
    fn update(&self, label: &str, sample: &ProgressSample) {
        if !self.should_log(label) {
            return;
        }
        match sample.percent() {
            Some(percent) => debug!(
                label,
                position = sample.position,
                total = ?sample.total,
                speed = sample.speed,
                "{:.1}% done",
                percent
            ),
            None => debug!(
                label,
                position = sample.position,
                speed = sample.speed,
                "{:.1}s processed",
                sample.position
            ),
        }
    }

    fn task_started(&self, label: &str, chunk: &str) {
        debug!(label, chunk, "Task started");
    }

    fn task_finished(&self, label: &str, chunk: &str, ok: bool) {
        // A fresh task should log its first sample right away.
        self.last_logged.lock().remove(label);
        debug!(label, chunk, ok, "Task finished");
    }
}

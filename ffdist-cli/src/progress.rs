//! Terminal progress: one bar per worker host plus the split and merge phases.

use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

use ffdist::ffmpeg::ProgressSample;
use ffdist::pipeline::ProgressSink;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Bar positions are in milliseconds of media time.
const UNITS_PER_SECOND: f64 = 1000.0;

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>14.cyan.bold} [{bar:30.green/white}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>14.cyan.bold} {spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&[
            "▹▹▹▹▹",
            "▸▹▹▹▹",
            "▹▸▹▹▹",
            "▹▹▸▹▹",
            "▹▹▹▸▹",
            "▹▹▹▹▸",
            "▪▪▪▪▪",
        ])
}

struct LabelState {
    bar: ProgressBar,
    chunk: String,
    has_total: bool,
}

/// Progress sink drawing into an indicatif [`MultiProgress`].
pub struct BarProgress {
    multi: MultiProgress,
    labels: Mutex<HashMap<String, LabelState>>,
}

impl BarProgress {
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            labels: Mutex::new(HashMap::new()),
        }
    }

    /// Log writer that draws log lines above the bars.
    pub fn log_writer(&self) -> SuspendingWriter {
        SuspendingWriter {
            multi: self.multi.clone(),
        }
    }

    fn with_label<F>(&self, label: &str, f: F)
    where
        F: FnOnce(&mut LabelState),
    {
        let mut labels = self.labels.lock();
        let state = labels.entry(label.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            LabelState {
                bar,
                chunk: String::new(),
                has_total: false,
            }
        });
        f(state);
    }

    /// Remove every bar from the terminal.
    pub fn clear(&self) {
        for (_, state) in self.labels.lock().drain() {
            state.bar.finish_and_clear();
        }
        let _ = self.multi.clear();
    }
}

impl ProgressSink for BarProgress {
    fn update(&self, label: &str, sample: &ProgressSample) {
        self.with_label(label, |state| {
            match sample.total {
                Some(total) if total > 0.0 => {
                    if !state.has_total {
                        state.bar.set_style(bar_style());
                        state.has_total = true;
                    }
                    state.bar.set_length((total * UNITS_PER_SECOND) as u64);
                    state
                        .bar
                        .set_position((sample.position.max(0.0) * UNITS_PER_SECOND) as u64);
                    state.bar.set_message(format!(
                        "{} {:.1}s/{:.1}s {:.2}x",
                        state.chunk, sample.position, total, sample.speed
                    ));
                }
                _ => state.bar.set_message(format!(
                    "{} {:.1}s {:.2}x",
                    state.chunk, sample.position, sample.speed
                )),
            }
        });
    }

    fn task_started(&self, label: &str, chunk: &str) {
        self.with_label(label, |state| {
            state.chunk = chunk.to_string();
            state.has_total = false;
            state.bar.set_style(spinner_style());
            state.bar.set_position(0);
            state.bar.set_message(chunk.to_string());
        });
    }

    fn task_finished(&self, label: &str, chunk: &str, ok: bool) {
        self.with_label(label, |state| {
            let status = if ok { "done" } else { "failed" };
            state.bar.set_message(format!("{chunk} {status}"));
        });
    }
}

/// [`MakeWriter`] that suspends the progress bars while a log line is
/// written to stderr.
#[derive(Clone)]
pub struct SuspendingWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for SuspendingWriter {
    type Writer = SuspendedLine;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedLine {
            multi: self.multi.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one formatted event and writes it on drop.
pub struct SuspendedLine {
    multi: MultiProgress,
    buf: Vec<u8>,
}

impl Write for SuspendedLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SuspendedLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let buf = std::mem::take(&mut self.buf);
        self.multi.suspend(|| {
            let _ = io::stderr().write_all(&buf);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(position: f64, total: Option<f64>) -> ProgressSample {
        ProgressSample {
            frame: 10,
            fps: 25.0,
            position,
            total,
            speed: 1.5,
        }
    }

    #[test]
    fn test_bars_follow_samples() {
        let progress = BarProgress::new(false);
        progress.task_started("box1", "00000003.mkv");
        progress.update("box1", &sample(1.0, None));
        progress.update("box1", &sample(5.0, Some(10.0)));
        // Duplicate and out of order updates are harmless.
        progress.update("box1", &sample(4.0, Some(10.0)));

        let labels = progress.labels.lock();
        let state = labels.get("box1").unwrap();
        assert!(state.has_total);
        assert_eq!(state.bar.length(), Some(10_000));
        assert_eq!(state.bar.position(), 4_000);
        assert_eq!(state.chunk, "00000003.mkv");
    }

    #[test]
    fn test_new_task_resets_the_bar() {
        let progress = BarProgress::new(false);
        progress.task_started("split", "movie.mkv");
        progress.update("split", &sample(30.0, Some(60.0)));
        progress.task_finished("split", "movie.mkv", true);
        progress.task_started("split", "movie.mkv");

        let labels = progress.labels.lock();
        let state = labels.get("split").unwrap();
        assert!(!state.has_total);
        assert_eq!(state.bar.position(), 0);
    }

    #[test]
    fn test_writer_buffers_until_drop() {
        let progress = BarProgress::new(false);
        let writer = progress.log_writer();
        let mut line = writer.make_writer();
        line.write_all(b"hello\n").unwrap();
        assert_eq!(line.buf, b"hello\n");
    }
}

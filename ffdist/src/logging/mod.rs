//! Logging setup.
//!
//! This module provides:
//! - An `EnvFilter` from `RUST_LOG`, or a default derived from the verbosity
//! - Console output through a caller supplied writer
//! - Optional daily-rolling log files with retention cleanup
//! - Local timezone timestamps for logs

use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;
use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "ffdist=info,ffdist_cli=info";

/// Base name of the rolling log files (`ffdist.log.YYYY-MM-DD`).
const LOG_FILE_NAME: &str = "ffdist.log";

/// Log retention period in days.
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub verbosity: Verbosity,
    /// Also write logs to daily files in this directory.
    pub log_dir: Option<PathBuf>,
    /// Colored console output.
    pub ansi: bool,
}

/// Whether the `DEBUG` environment variable asks for debug output.
pub fn debug_env_requested() -> bool {
    std::env::var_os("DEBUG").is_some_and(|v| !v.is_empty() && v != "0")
}

/// The filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: Verbosity, debug_env: bool) -> String {
    let level = match verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Verbose => "debug",
        Verbosity::Normal if debug_env => "debug",
        Verbosity::Normal => return DEFAULT_LOG_FILTER.to_string(),
    };
    format!("ffdist={level},ffdist_cli={level}")
}

/// Install the global subscriber.
///
/// Console lines go to `writer`. When a log directory is configured, the
/// returned guard flushes the file writer on drop and must be kept alive for
/// the rest of the program.
pub fn init_logging<W>(options: &LoggingOptions, writer: W) -> Result<Option<WorkerGuard>>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directive(options.verbosity, debug_env_requested()))
    });

    let (file_layer, guard) = match &options.log_dir {
        Some(log_dir) => {
            fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(options.ansi)
                .with_timer(LocalTimer)
                .with_target(false),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

/// Delete rolled log files older than `retention_days`.
///
/// Returns the number of deleted files.
pub async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_NAME}.");
    let mut deleted_count = 0;

    for path in fs::list_files_sorted(log_dir).await? {
        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

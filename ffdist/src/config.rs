//! Run configuration.
//!
//! Every section deserializes from TOML/JSON with defaults for missing
//! fields, so a config file only needs to name what it changes.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::Host;
use crate::{Error, Result};

/// Default segment length in seconds.
pub const DEFAULT_SEGMENT_SECONDS: f64 = 10.0;

/// How the media tool is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Program name or path.
    pub binary: String,
    /// Arguments placed before every generated argument list.
    pub prefix_args: Vec<String>,
    /// Pass `-hide_banner`.
    pub hide_banner: bool,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            prefix_args: Vec::new(),
            hide_banner: true,
        }
    }
}

/// The remote shell used for every host other than `localhost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteShellConfig {
    pub program: String,
    /// Arguments applied to every remote host, before its own transport args.
    pub args: Vec<String>,
}

impl Default for RemoteShellConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            args: Vec::new(),
        }
    }
}

impl RemoteShellConfig {
    pub fn shell(&self) -> process_utils::RemoteShell {
        process_utils::RemoteShell::new(self.program.clone()).with_args(self.args.iter().cloned())
    }
}

/// Subprocess supervision timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Upper bound between two wake-ups of the monitor loop.
    pub poll_interval_ms: u64,
    /// How long to wait for a finished or stopped child before abandoning it.
    pub reap_grace_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            reap_grace_ms: 1000,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reap_grace(&self) -> Duration {
        Duration::from_millis(self.reap_grace_ms)
    }
}

/// Configuration of one encode run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// One worker is started per host.
    pub hosts: Vec<Host>,
    /// Target segment length in seconds.
    pub segment_seconds: f64,
    /// Extra arguments of every per-segment transform, e.g. `-c:v libx264 -crf 23`.
    pub transcode_args: Vec<String>,
    /// Extra arguments of the splitting invocation, e.g. `-an`.
    pub split_args: Vec<String>,
    /// Explicit working directory. Derived from the input path when unset.
    pub work_dir: Option<PathBuf>,
    /// Keep the working directory after a successful run.
    pub keep_work_dir: bool,
    /// Reuse an existing working directory and skip finished segments.
    pub resume: bool,
    pub ffmpeg: FfmpegConfig,
    pub remote: RemoteShellConfig,
    pub monitor: MonitorConfig,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
            transcode_args: Vec::new(),
            split_args: Vec::new(),
            work_dir: None,
            keep_work_dir: false,
            resume: false,
            ffmpeg: FfmpegConfig::default(),
            remote: RemoteShellConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl EncodeConfig {
    /// Check the configuration before anything touches the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::validation("at least one host is required"));
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(Error::validation("host names must not be empty"));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(Error::validation(format!(
                    "host '{}' is listed more than once",
                    host.name
                )));
            }
        }

        if !self.segment_seconds.is_finite() || self.segment_seconds <= 0.0 {
            return Err(Error::validation(format!(
                "segment length must be a positive number of seconds, got {}",
                self.segment_seconds
            )));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(Error::config("monitor.poll_interval_ms must be greater than zero"));
        }

        if self.ffmpeg.binary.is_empty() {
            return Err(Error::config("ffmpeg.binary must not be empty"));
        }

        Ok(())
    }
}

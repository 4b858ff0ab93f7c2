//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors of an encode run.
///
/// Per-chunk transform failures are not errors: workers recover them by
/// re-queuing the task.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Splitting the input failed (exit code {exit_code:?})")]
    SplitFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Splitting produced no segments in {0}")]
    NoSegments(PathBuf),

    #[error("Merging the encoded segments failed (exit code {exit_code:?})")]
    MergeFailed {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Cannot merge: {} segment(s) have no encoded output", missing.len())]
    IncompleteOutput { missing: Vec<PathBuf> },

    #[error("Working directory {0} already exists (use resume to continue it)")]
    WorkDirExists(PathBuf),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker on {} panicked, run aborted", hosts.join(", "))]
    WorkerPanicked { hosts: Vec<String> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Diagnostic text captured from the failing subprocess, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::SplitFailed { diagnostics, .. } | Self::MergeFailed { diagnostics, .. } => {
                Some(diagnostics.as_str())
            }
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SplitFailed { .. } | Self::NoSegments(_) => 2,
            Self::MergeFailed { .. } | Self::IncompleteOutput { .. } => 3,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

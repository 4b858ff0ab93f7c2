//! Distributed segment-parallel ffmpeg encoding.
//!
//! An input file is split into fixed-length chunks, the chunks are encoded
//! concurrently by one worker per host (locally or through a remote shell),
//! and the encoded chunks are merged back together with the untouched audio,
//! subtitle and metadata streams of the source.

pub mod concat;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod logging;
pub mod pipeline;
pub mod segmenter;
pub mod utils;
pub mod workdir;

pub use config::{EncodeConfig, FfmpegConfig, MonitorConfig, RemoteShellConfig};
pub use encoder::{EncodeReport, encode};
pub use error::{Error, Result};
pub use pipeline::{Host, ProgressSink, Task, TaskQueue};
pub use workdir::WorkDir;

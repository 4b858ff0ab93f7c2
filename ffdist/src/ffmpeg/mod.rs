//! Everything that talks to the media tool: invocation shapes, the
//! diagnostic stream grammar and the process monitor.

mod command;
mod monitor;
mod parser;
mod record_reader;

pub use command::{FfmpegCommand, Invocation, StdioTarget};
pub use monitor::{ProcessMonitor, ProcessOutcome, ProgressSample};
pub use parser::{DiagnosticLine, ProgressLine, parse_line, parse_timestamp};
pub use record_reader::RecordReader;

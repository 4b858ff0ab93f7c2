use std::path::PathBuf;

use clap::Parser;

/// Split a video into segments, encode them on several hosts in parallel
/// with ffmpeg, and merge the encoded segments back together.
///
/// Everything after `--` is passed to every per-segment ffmpeg, e.g.
/// `ffdist -H localhost -H box2 in.mkv out.mkv -- -c:v libx264 -crf 23`.
#[derive(Parser, Debug, Clone)]
#[command(name = "ffdist", author, version, about, long_about = None)]
pub struct Args {
    /// File to encode
    pub input: PathBuf,

    /// Path of the encoded output file
    pub output: PathBuf,

    /// Arguments for the per-segment ffmpeg instances
    #[arg(last = true, value_name = "FFMPEG_ARGS")]
    pub ffmpeg_args: Vec<String>,

    /// Host to encode on; `localhost` runs on this machine, anything else is
    /// reached over ssh and may include a user name. Repeatable.
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Segment length in seconds [default: 10]
    #[arg(short, long = "segment-length", value_name = "SECONDS")]
    pub segment_length: Option<f64>,

    /// Keep the temporary segment files after a successful run
    #[arg(short, long)]
    pub keep_tmp: bool,

    /// Reuse existing segments and only encode the missing ones
    #[arg(short, long)]
    pub resume: bool,

    /// Directory for temporary files; must not exist unless resuming
    #[arg(short, long, value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Extra argument for the splitting ffmpeg, e.g. `--split-arg=-an`. Repeatable.
    #[arg(long = "split-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub split_args: Vec<String>,

    /// Extra argument for ssh, applied to every remote host. Repeatable.
    #[arg(long = "ssh-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub ssh_args: Vec<String>,

    /// TOML configuration file
    #[arg(short, long, env = "FFDIST_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors, no progress bars
    #[arg(short, long)]
    pub quiet: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

//! FFmpeg invocation builders.
//!
//! An [`Invocation`] is a fully described child process: program, arguments
//! and where stdin/stdout point. Files are only opened when the invocation is
//! turned into a command, right before spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::{RemoteShell, shell_join, tokio_command};

use crate::config::FfmpegConfig;
use crate::{Error, Result};

/// Container format used on the pipes of a transform.
const PIPE_FORMAT: &str = "matroska";

/// Where a standard stream of the child points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StdioTarget {
    #[default]
    Null,
    /// Read from an existing file.
    ReadFile(PathBuf),
    /// Write to a file, created or truncated.
    WriteFile(PathBuf),
}

impl StdioTarget {
    fn open(&self) -> Result<Stdio> {
        match self {
            Self::Null => Ok(Stdio::null()),
            Self::ReadFile(path) => std::fs::File::open(path)
                .map(Stdio::from)
                .map_err(|e| Error::io_path("opening input", path, e)),
            Self::WriteFile(path) => std::fs::File::create(path)
                .map(Stdio::from)
                .map_err(|e| Error::io_path("creating output", path, e)),
        }
    }
}

/// A child process description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: StdioTarget,
    stdout: StdioTarget,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: StdioTarget::Null,
            stdout: StdioTarget::Null,
        }
    }

    pub fn stdin(mut self, target: StdioTarget) -> Self {
        self.stdin = target;
        self
    }

    pub fn stdout(mut self, target: StdioTarget) -> Self {
        self.stdout = target;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn stdin_target(&self) -> &StdioTarget {
        &self.stdin
    }

    pub fn stdout_target(&self) -> &StdioTarget {
        &self.stdout
    }

    /// Route this invocation through `shell` so it runs on `host`.
    ///
    /// The program and arguments travel as one quoted command line; the
    /// stdin/stdout bindings stay local and are forwarded by the shell.
    pub fn remote(self, shell: &RemoteShell, host: &str, transport_args: &[String]) -> Self {
        let remote_command = self.command_line();
        Self {
            program: shell.program().to_string(),
            args: shell.argv(host, transport_args, &remote_command),
            stdin: self.stdin,
            stdout: self.stdout,
        }
    }

    /// Program and arguments as a single shell-quoted line.
    pub fn command_line(&self) -> String {
        shell_join(std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)))
    }

    /// Build the tokio command, opening any bound files.
    ///
    /// stderr is always piped so the diagnostic stream can be monitored.
    pub(crate) fn to_command(&self) -> Result<tokio::process::Command> {
        let mut cmd = tokio_command(&self.program);
        cmd.args(&self.args)
            .env("LC_ALL", "C")
            .stdin(self.stdin.open()?)
            .stdout(self.stdout.open()?)
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Builds the three invocations of an encode run.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    config: FfmpegConfig,
}

impl FfmpegCommand {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all: Vec<String> = self.config.prefix_args.clone();
        if self.config.hide_banner {
            all.push("-hide_banner".to_string());
        }
        all.extend(args.into_iter().map(Into::into));
        Invocation::new(self.config.binary.clone(), all)
    }

    /// Split `input` into copies of its first video stream, `segment_seconds`
    /// long, named after `pattern` (e.g. `in/%08d.mkv`).
    pub fn split(
        &self,
        input: &Path,
        pattern: &Path,
        segment_seconds: f64,
        split_args: &[String],
    ) -> Invocation {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-c".into(),
            "copy".into(),
        ];
        args.extend(split_args.iter().cloned());
        args.extend([
            "-f".to_string(),
            "segment".to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-segment_time".to_string(),
            segment_seconds.to_string(),
            pattern.to_string_lossy().into_owned(),
        ]);
        self.invocation(args)
    }

    /// Transform one segment read from stdin into stdout.
    pub fn transform(&self, input: &Path, output: &Path, extra_args: &[String]) -> Invocation {
        let mut args: Vec<String> = vec!["-f".into(), PIPE_FORMAT.into(), "-i".into(), "pipe:".into()];
        args.extend(extra_args.iter().cloned());
        args.extend(["-f".to_string(), PIPE_FORMAT.to_string(), "pipe:".to_string()]);

        self.invocation(args)
            .stdin(StdioTarget::ReadFile(input.to_path_buf()))
            .stdout(StdioTarget::WriteFile(output.to_path_buf()))
    }

    /// Concatenate the segments listed in `manifest` losslessly and take every
    /// non-video stream, chapters and global metadata from `source`.
    ///
    /// The `?` markers keep the merge working when the source lacks audio or
    /// subtitles.
    pub fn concat(&self, manifest: &Path, source: &Path, output: &Path) -> Invocation {
        self.invocation([
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest.to_string_lossy().into_owned(),
            "-i".to_string(),
            source.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a?".to_string(),
            "-map".to_string(),
            "1:s?".to_string(),
            "-map_metadata".to_string(),
            "1".to_string(),
            "-map_chapters".to_string(),
            "1".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().into_owned(),
        ])
    }
}

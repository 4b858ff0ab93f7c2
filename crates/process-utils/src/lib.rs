//! Small process-related helpers shared across the workspace.
//!
//! - `CREATE_NO_WINDOW` handling for child processes on Windows
//! - POSIX shell quoting for commands that travel as a single string
//! - Wrapping a command for execution on another host through a remote shell

use std::borrow::Cow;
use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '_' | '-')
}

/// Quote a single word so a POSIX shell reads it back verbatim.
///
/// Words made only of safe characters are returned unchanged.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    if word.is_empty() {
        return Cow::Borrowed("''");
    }
    if word.chars().all(is_shell_safe) {
        return Cow::Borrowed(word);
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for c in word.chars() {
        if c == '\'' {
            quoted.push_str("'\"'\"'");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Join an argument vector into one shell command line.
pub fn shell_join<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| shell_quote(a.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A remote shell program (`ssh` by default) used to run a pre-joined
/// command line on a named host.
///
/// The produced command behaves like a local child: its stdin/stdout/stderr
/// are forwarded to and from the remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteShell {
    program: String,
    args: Vec<String>,
}

impl Default for RemoteShell {
    fn default() -> Self {
        Self::new("ssh")
    }
}

impl RemoteShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before every host, e.g. `-o BatchMode=yes`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector (without the program) for running
    /// `remote_command` on `host`.
    pub fn argv(&self, host: &str, transport_args: &[String], remote_command: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + transport_args.len() + 2);
        argv.extend(self.args.iter().cloned());
        argv.extend(transport_args.iter().cloned());
        argv.push(host.to_string());
        argv.push(remote_command.to_string());
        argv
    }
}

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Host name that means "run on this machine".
pub const LOCALHOST: &str = "localhost";

/// One unit of work: one chunk in, one chunk out.
///
/// Tasks are plain values. A failed task goes back into the queue as an
/// equal copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub extra_args: Vec<String>,
}

impl Task {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            extra_args,
        }
    }

    /// File name of the input chunk, used in labels and logs.
    pub fn chunk_name(&self) -> String {
        file_label(&self.input_path)
    }
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A machine that runs one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// `localhost` or anything the remote shell accepts as a destination.
    pub name: String,
    /// Arguments passed to the remote shell for this host only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transport_args: Vec<String>,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport_args: Vec::new(),
        }
    }

    pub fn with_transport_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transport_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_local(&self) -> bool {
        self.name == LOCALHOST
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_identity_is_structural() {
        let a = Task::new("/w/in/00000001.mkv", "/w/out/00000001.mkv", vec!["-crf".into()]);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.chunk_name(), "00000001.mkv");
    }

    #[test]
    fn test_host_deserialize() {
        #[derive(Deserialize)]
        struct Doc {
            hosts: Vec<Host>,
        }

        let doc: Doc = serde_json::from_str(
            r#"{"hosts":[{"name":"localhost"},{"name":"box2","transport_args":["-p","2222"]}]}"#,
        )
        .unwrap();
        assert!(doc.hosts[0].is_local());
        assert!(doc.hosts[0].transport_args.is_empty());
        assert!(!doc.hosts[1].is_local());
        assert_eq!(doc.hosts[1].transport_args, vec!["-p", "2222"]);
        assert_eq!(doc.hosts[1].to_string(), "box2");
    }
}

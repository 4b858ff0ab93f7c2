//! Temporary directory of an encode run.
//!
//! ```text
//! <root>/
//!   in/00000000.mkv ...    chunks written by the splitter
//!   out/00000000.mkv ...   encoded chunks, same names
//!   segments.txt           merge manifest, only while merging
//! ```
//!
//! Resume state lives entirely in this layout: an `out/` file exists only
//! for a chunk whose last attempt succeeded.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::pipeline::Task;
use crate::utils::fs::{absolute, ensure_dir_all_with_op, io_error, list_files_sorted};
use crate::{Error, Result};

const INPUT_DIR: &str = "in";
const OUTPUT_DIR: &str = "out";
const MANIFEST_FILE: &str = "segments.txt";
const CHUNK_PATTERN: &str = "%08d.mkv";
const DEFAULT_PREFIX: &str = "ffmpeg_segments_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The explicit directory if given, otherwise a directory in the current
    /// directory named after the hash of the absolute input path, so that a
    /// rerun on the same input finds the same directory.
    pub fn resolve(input: &Path, explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(dir) => absolute(dir)?,
            None => absolute(Path::new(&Self::default_name(&absolute(input)?)))?,
        };
        Ok(Self { root })
    }

    /// `ffmpeg_segments_<md5 of the path>`.
    pub fn default_name(input: &Path) -> String {
        let mut hasher = Md5::new();
        hasher.update(input.to_string_lossy().as_bytes());
        format!("{DEFAULT_PREFIX}{}", hex::encode(hasher.finalize()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(INPUT_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Output name pattern handed to the splitter.
    pub fn chunk_pattern(&self) -> PathBuf {
        self.input_dir().join(CHUNK_PATTERN)
    }

    /// Where the encoded version of `chunk` goes.
    pub fn output_for(&self, chunk: &Path) -> PathBuf {
        match chunk.file_name() {
            Some(name) => self.output_dir().join(name),
            None => self.output_dir().join(chunk),
        }
    }

    /// Create the layout. An existing root is only accepted when resuming.
    pub async fn prepare(&self, resume: bool) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(_) if !resume => return Err(Error::WorkDirExists(self.root.clone())),
            Ok(_) => info!("Resuming in {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating working directory {}", self.root.display());
            }
            Err(e) => return Err(io_error("inspecting working directory", &self.root, e)),
        }

        ensure_dir_all_with_op("creating input chunk directory", &self.input_dir()).await?;
        ensure_dir_all_with_op("creating output chunk directory", &self.output_dir()).await?;
        Ok(())
    }

    /// Input chunks in temporal order.
    pub async fn input_chunks(&self) -> Result<Vec<PathBuf>> {
        list_files_sorted(&self.input_dir()).await
    }

    /// Encoded chunks in temporal order.
    pub async fn completed_outputs(&self) -> Result<Vec<PathBuf>> {
        list_files_sorted(&self.output_dir()).await
    }

    /// One task per input chunk that has no encoded output yet.
    pub async fn pending_tasks(&self, extra_args: &[String]) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for chunk in self.input_chunks().await? {
            let output = self.output_for(&chunk);
            if tokio::fs::try_exists(&output)
                .await
                .map_err(|e| io_error("checking output chunk", &output, e))?
            {
                continue;
            }
            tasks.push(Task::new(chunk, output, extra_args.to_vec()));
        }
        Ok(tasks)
    }

    /// Input chunks whose encoded output is missing.
    pub async fn missing_outputs(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .pending_tasks(&[])
            .await?
            .into_iter()
            .map(|t| t.input_path)
            .collect())
    }

    /// Delete the whole directory.
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("removing working directory", &self.root, e)),
        }
    }
}

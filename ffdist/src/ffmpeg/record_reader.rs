//! Record reader for a child's diagnostic stream.
//!
//! FFmpeg rewrites its progress line in place with carriage returns (`\r`).
//! Over a pipe those updates are never newline-terminated, so a plain
//! `lines()` reader would only surface them when the process ends.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

const READ_CHUNK: usize = 4096;

/// Longest record. Longer undelimited text is cut into records of this size.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Yields trimmed, non-empty text records delimited by `\n` or `\r`.
pub struct RecordReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    scratch: [u8; READ_CHUNK],
    eof: bool,
}

impl<R> RecordReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            scratch: [0u8; READ_CHUNK],
            eof: false,
        }
    }

    /// Next record, or `None` at end of stream.
    ///
    /// Cancel safe: bytes already read stay buffered in `self` when the
    /// returned future is dropped, so it can sit in a `tokio::select!`.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(record) = self.take_buffered() {
                return Ok(Some(record));
            }

            if self.eof {
                return Ok(self.take_remainder());
            }

            let n = self.reader.read(&mut self.scratch).await?;
            if n == 0 {
                self.eof = true;
                continue;
            }
            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }

    /// Pop the first complete record out of the pending buffer.
    fn take_buffered(&mut self) -> Option<String> {
        while let Some(idx) = self.pending.iter().position(|&b| is_delimiter(b)) {
            let record_bytes: Vec<u8> = self.pending.drain(..idx).collect();
            let skip = self.pending.iter().take_while(|&&b| is_delimiter(b)).count();
            self.pending.drain(..skip);

            let record = String::from_utf8_lossy(&record_bytes).trim().to_string();
            if !record.is_empty() {
                return Some(record);
            }
        }

        if self.pending.len() >= MAX_RECORD_BYTES {
            let record_bytes: Vec<u8> = self.pending.drain(..MAX_RECORD_BYTES).collect();
            let record = String::from_utf8_lossy(&record_bytes).trim().to_string();
            if !record.is_empty() {
                return Some(record);
            }
        }
        None
    }

    /// Unterminated trailing text once the stream has ended.
    fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let record = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!record.is_empty()).then_some(record)
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'\n' | b'\r')
}

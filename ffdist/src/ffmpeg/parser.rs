//! FFmpeg diagnostic stream grammar.
//!
//! Every stderr record falls into exactly one of three kinds:
//! - a duration announcement: `Duration: 00:01:30.00, start: ...`
//! - a progress update: `frame=  100 fps= 25 q=28.0 size=1024kB time=00:00:04.00 bitrate=... speed=2.0x`
//! - anything else, which is kept as diagnostic text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `H:MM:SS(.fraction)`, optionally prefixed by a sign. Some encoders print
/// `-00:00:00.00` before the first frame.
const TIMESTAMP: &str = r"(-?)(\d+):(\d{2}):(\d{2}(?:\.\d+)?)";

static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"Duration:\s*{TIMESTAMP}")).unwrap());

static PROGRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"frame=\s*(\d+)\s+fps=\s*([\d.]+).*?time=\s*{TIMESTAMP}.*?speed=\s*(?:([\d.]+)x|N/A)"
    ))
    .unwrap()
});

/// Fields of one progress update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressLine {
    pub frame: u64,
    pub fps: f64,
    /// Elapsed media time in seconds.
    pub time_secs: f64,
    /// Processing speed relative to realtime. `speed=N/A` reads as 0.
    pub speed: f64,
}

/// Classification of one diagnostic record.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticLine<'a> {
    /// Nominal input duration in seconds.
    Duration(f64),
    Progress(ProgressLine),
    Other(&'a str),
}

/// Classify a single diagnostic record.
pub fn parse_line(line: &str) -> DiagnosticLine<'_> {
    if let Some(caps) = PROGRESS_REGEX.captures(line)
        && let Some(progress) = progress_from_captures(&caps)
    {
        return DiagnosticLine::Progress(progress);
    }

    if let Some(caps) = DURATION_REGEX.captures(line)
        && let Some(secs) = timestamp_from_captures(&caps, 1)
    {
        return DiagnosticLine::Duration(secs);
    }

    DiagnosticLine::Other(line)
}

/// Parse a bare `H:MM:SS(.fraction)` timestamp into seconds.
///
/// # Examples
/// ```
/// use ffdist::ffmpeg::parse_timestamp;
///
/// assert_eq!(parse_timestamp("00:01:30.50"), Some(90.5));
/// assert_eq!(parse_timestamp("-00:00:01.50"), Some(-1.5));
/// assert_eq!(parse_timestamp("1:30"), None);
/// ```
pub fn parse_timestamp(value: &str) -> Option<f64> {
    static BARE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(&format!(r"^\s*{TIMESTAMP}\s*$")).unwrap());

    let caps = BARE.captures(value)?;
    timestamp_from_captures(&caps, 1)
}

/// Read a timestamp whose sign group starts at capture index `first`.
fn timestamp_from_captures(caps: &Captures<'_>, first: usize) -> Option<f64> {
    let negative = caps.get(first).is_some_and(|m| m.as_str() == "-");
    let hours: f64 = caps.get(first + 1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(first + 2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(first + 3)?.as_str().parse().ok()?;

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    Some(if negative { -total } else { total })
}

fn progress_from_captures(caps: &Captures<'_>) -> Option<ProgressLine> {
    let frame = caps.get(1)?.as_str().parse().ok()?;
    let fps = caps.get(2)?.as_str().parse().ok()?;
    let time_secs = timestamp_from_captures(caps, 3)?;
    let speed = match caps.get(7) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0.0,
    };

    Some(ProgressLine {
        frame,
        fps,
        time_secs,
        speed,
    })
}

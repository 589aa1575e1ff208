//! Log line types shared by the stream workers, the supervisor and the UI.
//!
//! Workers produce `CapturedLine`s (already classified); the supervisor turns them
//! into `LogEntry`s by stamping the sequence number at append time, so the order of
//! ids always matches the order of a process's log sequence.

use chrono::{DateTime, Local};
use strip_ansi_escapes::strip;

use crate::classify::classify;

/// Indicates the source stream of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

impl StreamKind {
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// Severity assigned to a line by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A classified line on its way from a stream worker to the supervisor.
#[derive(Debug, Clone)]
pub struct CapturedLine {
    /// Name of the process that produced the line.
    pub process: String,
    /// Spawn generation of the instance that produced the line.
    pub generation: u64,
    pub source: StreamKind,
    pub level: LogLevel,
    /// Text with terminal escape sequences removed.
    pub message: String,
    /// The line exactly as framed from the stream.
    pub raw: String,
    pub timestamp: DateTime<Local>,
}

impl CapturedLine {
    /// Classifies `raw` and captures the current time.
    pub fn new(process: &str, generation: u64, source: StreamKind, raw: String) -> Self {
        let level = classify(&raw);
        let message = sanitize_text(&raw);
        Self {
            process: process.to_string(),
            generation,
            source,
            level,
            message,
            raw,
            timestamp: Local::now(),
        }
    }

    /// A line produced by the supervisor itself rather than by a child.
    pub fn synthetic(
        process: &str,
        level: LogLevel,
        message: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            process: process.to_string(),
            generation: 0,
            source: StreamKind::Stderr,
            level,
            message: message.into(),
            raw: raw.into(),
            timestamp: Local::now(),
        }
    }
}

/// One immutable entry of a process's log sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Unique id, `"{process}-{seq}"`.
    pub id: String,
    /// Strictly increasing across the whole run.
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    pub source: StreamKind,
    pub raw: String,
    pub process_name: String,
}

impl LogEntry {
    pub fn new(seq: u64, line: CapturedLine) -> Self {
        Self {
            id: format!("{}-{}", line.process, seq),
            seq,
            timestamp: line.timestamp,
            level: line.level,
            message: line.message,
            source: line.source,
            raw: line.raw,
            process_name: line.process,
        }
    }
}

/// Removes ANSI escape sequences, replacing invalid UTF-8.
pub fn sanitize_text(text: &str) -> String {
    let stripped = strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Pretty-prints `text` if it is JSON or embeds a JSON object/array.
///
/// Returns `None` when nothing in the text parses as JSON.
pub fn format_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(pretty) = pretty_json(trimmed) {
            return Some(pretty);
        }
    }
    // Embedded JSON: widest span between the first opener and the last matching closer.
    for (open, close) in [('{', '}'), ('[', ']')] {
        let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) else {
            continue;
        };
        if start >= end {
            continue;
        }
        let candidate = &text[start..=end];
        if let Some(pretty) = pretty_json(candidate) {
            return Some(format!("{}{}{}", &text[..start], pretty, &text[end + 1..]));
        }
    }
    None
}

fn pretty_json(text: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(text).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

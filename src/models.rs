//! Core data models used throughout codectx.
//!
//! These types represent the files, cached records, and per-file states that
//! flow through the discovery, classification, and write-back pipeline.

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use std::fmt;
use std::path::PathBuf;

/// Timestamp layout used in the persisted document.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A file admitted by the walker, with its content fingerprint.
///
/// Built fresh on every run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    pub size: u64,
    /// Advisory only; staleness is decided by `fingerprint`.
    pub modified: DateTime<Local>,
    /// Lowercase hex SHA-256 of the full byte content.
    pub fingerprint: String,
}

impl DiscoveredFile {
    /// Human readable size: `812B`, `48K`, `3M`.
    pub fn size_str(&self) -> String {
        if self.size < 1024 {
            format!("{}B", self.size)
        } else if self.size < 1024 * 1024 {
            format!("{}K", self.size / 1024)
        } else {
            format!("{}M", self.size / (1024 * 1024))
        }
    }

    pub fn modified_str(&self) -> String {
        self.modified.format("%m-%d %H:%M").to_string()
    }
}

/// How a record's body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Body is the file content itself.
    Raw,
    /// Body came from the summarization service.
    Generated,
    /// Fixed placeholder body from mock mode.
    Mock,
    /// Diagnostic placeholder, e.g. size limit exceeded.
    Skipped,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Raw => "raw",
            RecordKind::Generated => "generated",
            RecordKind::Mock => "mock",
            RecordKind::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cached section of the digest, keyed by relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub path: String,
    /// Fingerprint of the exact content that produced `body`.
    pub fingerprint: Option<String>,
    pub summarized_at: NaiveDateTime,
    /// Never ends in whitespace; see [`SummaryRecord::new`].
    pub body: String,
    /// `None` for records read back from disk, which has no slot for it.
    pub kind: Option<RecordKind>,
}

impl SummaryRecord {
    /// Build a record stamped with the current time.
    ///
    /// Line endings in `body` are normalized to `\n` and trailing whitespace
    /// is trimmed, so the record survives a serialize/parse cycle unchanged.
    pub fn new(
        path: impl Into<String>,
        fingerprint: Option<String>,
        body: &str,
        kind: RecordKind,
    ) -> Self {
        Self {
            path: path.into(),
            fingerprint,
            summarized_at: timestamp_now(),
            body: body.replace("\r\n", "\n").replace('\r', "\n").trim_end().to_string(),
            kind: Some(kind),
        }
    }
}

/// Staleness of a discovered file relative to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Staleness {
    New,
    Changed,
    Unchanged,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Staleness::New => "new",
            Staleness::Changed => "changed",
            Staleness::Unchanged => "up-to-date",
        }
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local time truncated to whole seconds, matching [`TIMESTAMP_FORMAT`].
pub fn timestamp_now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_body_is_trimmed_at_end_only() {
        let record = SummaryRecord::new("a.py", None, "\n  x = 1\n\n\n", RecordKind::Raw);
        assert_eq!(record.body, "\n  x = 1");
        assert_eq!(record.kind, Some(RecordKind::Raw));
    }

    #[test]
    fn record_body_line_endings_are_normalized() {
        let record = SummaryRecord::new("win.py", None, "x = 1\r\ny = 2\rz = 3\r\n", RecordKind::Raw);
        assert_eq!(record.body, "x = 1\ny = 2\nz = 3");
    }

    #[test]
    fn timestamp_has_no_subseconds() {
        let ts = timestamp_now();
        let text = ts.format(TIMESTAMP_FORMAT).to_string();
        let parsed = NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn only_unchanged_is_fresh() {
        assert!(Staleness::New.is_stale());
        assert!(Staleness::Changed.is_stale());
        assert!(!Staleness::Unchanged.is_stale());
    }
}

//! The persisted digest document and its in-memory record store.
//!
//! # Document grammar
//!
//! ```text
//! document  := preamble section*
//! preamble  := any lines before the first section header
//! section   := header BLANK meta BLANK body
//! header    := "## " relative-path
//! meta      := "Summarized on " TIMESTAMP [" (checksum: " FINGERPRINT ")"]
//! body      := lines up to the next header or end of document
//! ```
//!
//! A line starting with `"## "` only opens a section when the next two lines
//! are a blank line and a line starting with `"Summarized on "`. Markdown
//! headings inside a body therefore stay in the body, unless they are
//! followed by exactly that pattern; that shape must not appear in bodies.
//!
//! Parsing never fails. A section whose metadata line does not parse is
//! dropped, and an unreadable or missing document loads as an empty store.
//! Trailing blank lines of a body belong to the separator and are removed.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

use crate::models::{SummaryRecord, TIMESTAMP_FORMAT};

const SECTION_SIGIL: &str = "## ";
const META_PREFIX: &str = "Summarized on ";

static META_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Summarized on (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?: \(checksum: ([0-9a-f]{64}|unreadable)\))?\s*$",
    )
    .expect("metadata pattern is valid")
});

static GENERATED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Generated by codectx on (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\s*$")
        .expect("generated pattern is valid")
});

static TOTAL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Total files processed: (\d+)\s*$").expect("total pattern is valid"));

/// Values read back from the document preamble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentHeader {
    pub generated_at: Option<NaiveDateTime>,
    pub record_count: Option<usize>,
}

/// Records keyed by relative path, as loaded from a prior document.
#[derive(Debug, Clone, Default)]
pub struct SummaryStore {
    records: BTreeMap<String, SummaryRecord>,
    header: DocumentHeader,
    /// Sections that were present but could not be parsed.
    dropped: usize,
    /// Sections superseded by a later section for the same path.
    duplicates: usize,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the document at `path`. Missing or unreadable files give an empty store.
    pub fn load_file(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let store = Self::parse(&text);
                debug!(
                    "loaded {} records from {} ({} dropped)",
                    store.len(),
                    path.display(),
                    store.dropped
                );
                store
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(e) => {
                warn!(
                    "could not read existing {}, treating as empty: {}",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Parse a document. Never fails; see the module docs for the grammar.
    pub fn parse(document: &str) -> Self {
        let lines: Vec<&str> = document.lines().collect();
        let starts: Vec<usize> = (0..lines.len())
            .filter(|&i| is_section_start(&lines, i))
            .collect();

        let preamble_end = starts.first().copied().unwrap_or(lines.len());
        let header = parse_preamble(&lines[..preamble_end]);

        let mut records = BTreeMap::new();
        let mut dropped = 0;
        let mut duplicates = 0;

        for (n, &start) in starts.iter().enumerate() {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            match parse_section(&lines[start..end]) {
                Some(record) => {
                    if records.contains_key(&record.path) {
                        debug!("duplicate section for {}, keeping the later one", record.path);
                        duplicates += 1;
                    }
                    records.insert(record.path.clone(), record);
                }
                None => {
                    debug!("dropping malformed section at line {}", start + 1);
                    dropped += 1;
                }
            }
        }

        Self {
            records,
            header,
            dropped,
            duplicates,
        }
    }

    pub fn get(&self, path: &str) -> Option<&SummaryRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    pub fn dropped_sections(&self) -> usize {
        self.dropped
    }

    pub fn duplicate_sections(&self) -> usize {
        self.duplicates
    }

    /// True when the parsed document held exactly the loaded records:
    /// no dropped or duplicate sections and a header count that agrees.
    pub fn is_clean(&self) -> bool {
        self.dropped == 0
            && self.duplicates == 0
            && self.header.record_count == Some(self.records.len())
    }

    /// Records in path order.
    pub fn records(&self) -> impl Iterator<Item = &SummaryRecord> {
        self.records.values()
    }

    pub fn insert(&mut self, record: SummaryRecord) {
        self.records.insert(record.path.clone(), record);
    }
}

fn is_section_start(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with(SECTION_SIGIL)
        && lines[i].len() > SECTION_SIGIL.len()
        && lines.get(i + 1).is_some_and(|l| l.trim().is_empty())
        && lines.get(i + 2).is_some_and(|l| l.starts_with(META_PREFIX))
}

fn parse_preamble(lines: &[&str]) -> DocumentHeader {
    let mut header = DocumentHeader::default();
    for line in lines {
        if let Some(caps) = GENERATED_LINE.captures(line) {
            header.generated_at = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok();
        } else if let Some(caps) = TOTAL_LINE.captures(line) {
            header.record_count = caps[1].parse().ok();
        }
    }
    header
}

/// `lines` starts at a header that passed [`is_section_start`].
fn parse_section(lines: &[&str]) -> Option<SummaryRecord> {
    let path = &lines[0][SECTION_SIGIL.len()..];
    if path.trim().is_empty() {
        return None;
    }

    let caps = META_LINE.captures(lines[2])?;
    let summarized_at = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
    let fingerprint = caps.get(2).map(|m| m.as_str().to_string());

    let mut body_lines = &lines[3..];
    if body_lines.first().is_some_and(|l| l.is_empty()) {
        body_lines = &body_lines[1..];
    }
    let body = body_lines.join("\n").trim_end().to_string();

    Some(SummaryRecord {
        path: path.to_string(),
        fingerprint,
        summarized_at,
        body,
        kind: None,
    })
}

/// Render `records` as a document stamped with `generated_at`.
///
/// Records are written in relative-path order regardless of input order.
/// A record set with no entries still yields a valid document with a zero
/// count.
pub fn serialize(records: &[SummaryRecord], generated_at: NaiveDateTime) -> String {
    let mut ordered: Vec<&SummaryRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let mut out = String::new();
    let _ = write!(
        out,
        "# Project Summary\n\nGenerated by codectx on {}\n\nTotal files processed: {}\n\n---\n\n",
        generated_at.format(TIMESTAMP_FORMAT),
        ordered.len()
    );

    for record in ordered {
        out.push_str(&format_section(record));
        out.push('\n');
    }

    out
}

/// One section, ending in a single newline (no separator).
pub fn format_section(record: &SummaryRecord) -> String {
    let mut section = String::new();
    let _ = write!(
        section,
        "{}{}\n\n{}{}",
        SECTION_SIGIL,
        record.path,
        META_PREFIX,
        record.summarized_at.format(TIMESTAMP_FORMAT)
    );
    if let Some(fingerprint) = &record.fingerprint {
        let _ = write!(section, " (checksum: {})", fingerprint);
    }
    section.push_str("\n\n");
    section.push_str(record.body.trim_end());
    section.push('\n');
    section
}

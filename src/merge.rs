//! Merge of fresh and stored records, and atomic write-back.
//!
//! The merged set holds exactly one record per discovered path that has
//! either a fresh record from this run or a stored one. Stored records for
//! paths that were not discovered (deleted, renamed, newly ignored) are
//! dropped, so the document never accumulates ghosts.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{CodectxError, Result};
use crate::models::{timestamp_now, SummaryRecord};
use crate::store::{serialize, SummaryStore};

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub fresh: usize,
    pub carried: usize,
    pub dropped: usize,
}

/// Merge `fresh` over `stored`, keeping only paths in `discovered`.
///
/// Fresh records win. The result is sorted by path.
pub fn merge<'a, I>(
    fresh: &BTreeMap<String, SummaryRecord>,
    stored: &SummaryStore,
    discovered: I,
) -> (Vec<SummaryRecord>, MergeStats)
where
    I: IntoIterator<Item = &'a str>,
{
    let discovered: BTreeSet<&str> = discovered.into_iter().collect();
    let mut stats = MergeStats::default();
    let mut merged = Vec::with_capacity(discovered.len());

    for path in &discovered {
        if let Some(record) = fresh.get(*path) {
            stats.fresh += 1;
            merged.push(record.clone());
        } else if let Some(record) = stored.get(path) {
            stats.carried += 1;
            merged.push(record.clone());
        }
    }

    stats.dropped = stored
        .records()
        .filter(|r| !discovered.contains(r.path.as_str()))
        .count();

    (merged, stats)
}

/// True when rewriting the document would reproduce it: `merged` holds the
/// same records as `stored` (ignoring kinds) and the parsed document had no
/// dropped or duplicate sections.
pub fn unchanged_from(merged: &[SummaryRecord], stored: &SummaryStore) -> bool {
    stored.is_clean()
        && merged.len() == stored.len()
        && merged.iter().zip(stored.records()).all(|(a, b)| {
            a.path == b.path
                && a.fingerprint == b.fingerprint
                && a.summarized_at == b.summarized_at
                && a.body == b.body
        })
}

/// Serialize `records` and replace the document at `path` atomically.
///
/// The content goes to a temporary file in the same directory first, so a
/// crash or a failed write leaves the prior document intact.
pub fn write_document(path: &Path, records: &[SummaryRecord]) -> Result<()> {
    let content = serialize(records, timestamp_now());
    let write_err = |source| CodectxError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

//! Source tree discovery.
//!
//! Walks the scan root with `walkdir`, pruning ignored directories before
//! they are opened, and fingerprints every admitted file by streaming it
//! through SHA-256. Files that cannot be stat'ed or read (permissions,
//! broken symlinks) land in the ignored list instead of failing the run.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CodectxError, Result};
use crate::ignore::IgnoreRuleSet;
use crate::models::DiscoveredFile;

/// Read size used when hashing file content.
pub const CHUNK_SIZE: usize = 4096;

/// Result of one discovery pass.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Canonical scan root.
    pub root: PathBuf,
    /// Admitted files, sorted by relative path.
    pub files: Vec<DiscoveredFile>,
    /// Ignored or unreadable entries, sorted. Pruned directories appear once.
    pub ignored: Vec<String>,
    pub pattern_count: usize,
}

impl Discovery {
    pub fn total(&self) -> usize {
        self.files.len() + self.ignored.len()
    }

    pub fn relative_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.relative_path.as_str())
    }
}

/// Check that `root` is an existing directory and canonicalize it.
///
/// Performs no other I/O, so a bad root fails before anything is read.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(CodectxError::config(format!(
            "directory does not exist: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(CodectxError::config(format!(
            "path is not a directory: {}",
            root.display()
        )));
    }
    root.canonicalize()
        .map_err(|e| CodectxError::config(format!("cannot resolve {}: {}", root.display(), e)))
}

/// Discover files under `root`, filtered by `rules`.
pub fn discover(root: &Path, rules: &IgnoreRuleSet) -> Result<Discovery> {
    let root = resolve_root(root)?;

    let mut files = Vec::new();
    let mut ignored = Vec::new();

    let mut walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let rel = e
                    .path()
                    .map(|p| relative_path(&root, p))
                    .unwrap_or_default();
                warn!("skipping unreadable entry {}: {}", rel, e);
                if !rel.is_empty() {
                    ignored.push(rel);
                }
                continue;
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        let rel = relative_path(&root, entry.path());
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if rules.is_ignored(&rel) {
                debug!("pruning ignored directory {}", rel);
                walker.skip_current_dir();
                ignored.push(rel);
            }
            continue;
        }

        if rules.is_ignored(&rel) {
            ignored.push(rel);
            continue;
        }

        if !fits_section_header(&rel) {
            warn!("skipping {:?}: path cannot be stored as a section header", rel);
            ignored.push(rel);
            continue;
        }

        // Symlinks are resolved but never descended into.
        if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("skipping broken symlink {}: {}", rel, e);
                    ignored.push(rel);
                    continue;
                }
            }
        } else if !file_type.is_file() {
            continue;
        }

        match describe_file(entry.path(), &rel) {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!("skipping unreadable file {}: {}", rel, e);
                ignored.push(rel);
            }
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    ignored.sort();

    Ok(Discovery {
        root,
        files,
        ignored,
        pattern_count: rules.pattern_count(),
    })
}

fn describe_file(path: &Path, relative: &str) -> io::Result<DiscoveredFile> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now());
    let fingerprint = fingerprint_file(path)?;

    Ok(DiscoveredFile {
        path: path.to_path_buf(),
        relative_path: relative.to_string(),
        size: metadata.len(),
        modified,
        fingerprint,
    })
}

/// A section header holds the path on one line and a blank path never
/// opens a section.
fn fits_section_header(relative: &str) -> bool {
    !relative.contains(['\n', '\r']) && !relative.trim().is_empty()
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// SHA-256 of a file's content, read in [`CHUNK_SIZE`] pieces.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer; equal to [`fingerprint_file`] for the same bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

//! Staleness classification.
//!
//! Compares each discovered file's fingerprint with the stored record for
//! its path. Modification times are never consulted: touching a file
//! without changing its bytes leaves it `Unchanged`.

use std::collections::BTreeMap;

use crate::models::{DiscoveredFile, Staleness};
use crate::store::SummaryStore;

/// Per-path staleness for one run. Computed once, then read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    states: BTreeMap<String, Staleness>,
}

impl Classification {
    pub fn get(&self, path: &str) -> Option<Staleness> {
        self.states.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Staleness)> {
        self.states.iter().map(|(p, s)| (p.as_str(), *s))
    }

    pub fn count(&self, state: Staleness) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn stale_count(&self) -> usize {
        self.states.values().filter(|s| s.is_stale()).count()
    }

    pub fn is_stale(&self, path: &str) -> bool {
        self.get(path).is_some_and(|s| s.is_stale())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Classify `discovered` against `store`.
///
/// - no record for the path: `New`
/// - record whose fingerprint is absent or differs: `Changed`
/// - otherwise: `Unchanged`
pub fn classify(discovered: &[DiscoveredFile], store: &SummaryStore) -> Classification {
    let states = discovered
        .iter()
        .map(|file| {
            let state = match store.get(&file.relative_path) {
                None => Staleness::New,
                Some(record) if record.fingerprint.as_deref() == Some(file.fingerprint.as_str()) => {
                    Staleness::Unchanged
                }
                Some(_) => Staleness::Changed,
            };
            (file.relative_path.clone(), state)
        })
        .collect();

    Classification { states }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{timestamp_now, SummaryRecord};
    use crate::walker::fingerprint_bytes;
    use chrono::{Duration, Local};
    use std::path::PathBuf;

    fn file(path: &str, content: &[u8]) -> DiscoveredFile {
        DiscoveredFile {
            path: PathBuf::from(path),
            relative_path: path.to_string(),
            size: content.len() as u64,
            modified: Local::now(),
            fingerprint: fingerprint_bytes(content),
        }
    }

    fn stored(path: &str, fingerprint: Option<String>) -> SummaryRecord {
        SummaryRecord {
            path: path.to_string(),
            fingerprint,
            summarized_at: timestamp_now(),
            body: "body".to_string(),
            kind: None,
        }
    }

    #[test]
    fn new_changed_unchanged() {
        let mut store = SummaryStore::new();
        store.insert(stored("same.py", Some(fingerprint_bytes(b"same"))));
        store.insert(stored("edited.py", Some(fingerprint_bytes(b"before"))));

        let files = vec![
            file("same.py", b"same"),
            file("edited.py", b"after"),
            file("fresh.py", b"new"),
        ];
        let result = classify(&files, &store);

        assert_eq!(result.get("same.py"), Some(Staleness::Unchanged));
        assert_eq!(result.get("edited.py"), Some(Staleness::Changed));
        assert_eq!(result.get("fresh.py"), Some(Staleness::New));
        assert_eq!(result.stale_count(), 2);
    }

    #[test]
    fn touched_but_identical_is_unchanged() {
        let mut store = SummaryStore::new();
        store.insert(stored("a.py", Some(fingerprint_bytes(b"x = 1"))));

        let mut touched = file("a.py", b"x = 1");
        touched.modified = Local::now() + Duration::days(30);

        let result = classify(&[touched], &store);
        assert_eq!(result.get("a.py"), Some(Staleness::Unchanged));
    }

    #[test]
    fn record_without_fingerprint_is_changed() {
        let mut store = SummaryStore::new();
        store.insert(stored("legacy.py", None));
        let result = classify(&[file("legacy.py", b"x")], &store);
        assert_eq!(result.get("legacy.py"), Some(Staleness::Changed));
    }

    #[test]
    fn store_only_paths_are_not_classified() {
        let mut store = SummaryStore::new();
        store.insert(stored("gone.py", None));
        let result = classify(&[], &store);
        assert!(result.is_empty());
    }
}

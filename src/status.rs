//! Status table for `codectx status`: one row per discovered file with its
//! size, modification time and staleness. Nothing is written.

use std::fmt::Write as _;

use crate::classify::Classification;
use crate::models::{DiscoveredFile, Staleness};
use crate::progress::format_number;

/// Render the status table: one row per discovered file, then a tally.
pub fn render_status(files: &[DiscoveredFile], classification: &Classification) -> String {
    let width = files
        .iter()
        .map(|f| f.relative_path.len())
        .max()
        .unwrap_or(0)
        .max("PATH".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>8}  {:<19}  STATE",
        "PATH",
        "SIZE",
        "MODIFIED",
        width = width
    );

    for file in files {
        let state = classification
            .get(&file.relative_path)
            .unwrap_or(Staleness::New);
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:<19}  {}",
            file.relative_path,
            file.size_str(),
            file.modified_str(),
            state,
            width = width
        );
    }

    let _ = writeln!(
        out,
        "\n{} files: {} new, {} changed, {} up-to-date",
        format_number(files.len()),
        format_number(classification.count(Staleness::New)),
        format_number(classification.count(Staleness::Changed)),
        format_number(classification.count(Staleness::Unchanged)),
    );
    out
}

pub fn print_status(files: &[DiscoveredFile], classification: &Classification) {
    print!("{}", render_status(files, classification));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::models::{timestamp_now, SummaryRecord};
    use crate::store::SummaryStore;
    use crate::walker::fingerprint_bytes;
    use chrono::Local;
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

    #[test]
    fn table_lists_every_file_with_state() {
        let mut store = SummaryStore::new();
        store.insert(SummaryRecord {
            path: "src/main.py".into(),
            fingerprint: Some(fingerprint_bytes(b"main")),
            summarized_at: timestamp_now(),
            body: "main".into(),
            kind: None,
        });
        let files = vec![file("src/main.py", b"main"), file("util.py", b"util")];
        let table = render_status(&files, &classify(&files, &store));

        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("PATH"));
        assert!(lines[1].starts_with("src/main.py") && lines[1].ends_with("up-to-date"));
        assert!(lines[2].starts_with("util.py") && lines[2].ends_with("new"));
        assert!(table.contains("2 files: 1 new, 0 changed, 1 up-to-date"));
    }
}

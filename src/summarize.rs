//! Per-file record production.
//!
//! Given a stale [`DiscoveredFile`], the [`Summarizer`] picks a strategy:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | content is binary or undecodable | no record, file stays stale |
//! | size above `max_file_size_mb` | `Skipped` record with a diagnostic body |
//! | estimated tokens below threshold, or mode `copy` | `Raw` record |
//! | mode `mock` | `Mock` record after the mock delay |
//! | mode `remote` | `Generated` record, or no record on failure |
//!
//! A record's fingerprint is taken from the bytes that were actually read,
//! so an edit racing with the run can never leave a body paired with the
//! wrong fingerprint.

use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Config, ProcessingMode, TextEncoding};
use crate::error::{CodectxError, Result};
use crate::models::{DiscoveredFile, RecordKind, SummaryRecord};
use crate::remote::{HttpSummaryClient, RetryPolicy, SummaryClient};
use crate::walker::fingerprint_bytes;

pub const MOCK_SUMMARY: &str = "- **Role**: This is a mocked summary of the file.
- **Classes**: None
- **Global Functions**: None
- **Dependencies**: None";

/// Bytes inspected when sniffing an oversized file for binary content.
const SNIFF_BYTES: u64 = 8192;

/// What happened to one stale file.
#[derive(Debug)]
pub enum Outcome {
    Produced(SummaryRecord),
    /// Binary or undecodable; deliberately left stale.
    Undecodable,
    /// Read or remote failure; no record, stays stale.
    Failed(CodectxError),
}

impl Outcome {
    pub fn record(&self) -> Option<&SummaryRecord> {
        match self {
            Outcome::Produced(r) => Some(r),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Produced(r) => r.kind.map_or("produced", |k| k.as_str()),
            Outcome::Undecodable => "undecodable",
            Outcome::Failed(_) => "error",
        }
    }
}

/// Strategy selection plus the remote client, shared by all workers.
pub struct Summarizer {
    mode: ProcessingMode,
    token_threshold: usize,
    max_file_bytes: u64,
    max_file_size_mb: f64,
    encodings: Vec<TextEncoding>,
    mock_delay: std::time::Duration,
    retry: RetryPolicy,
    client: Option<Arc<dyn SummaryClient>>,
}

impl Summarizer {
    /// Build from config, creating an HTTP client in remote mode.
    ///
    /// # Errors
    ///
    /// A configuration error when remote mode lacks a credential or endpoint.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client: Option<Arc<dyn SummaryClient>> = match config.mode {
            ProcessingMode::Remote => Some(Arc::new(
                HttpSummaryClient::new(config).map_err(|e| CodectxError::config(e.to_string()))?,
            )),
            _ => None,
        };
        Ok(Self::build(config, client))
    }

    /// Build with a caller-supplied backend for remote mode.
    pub fn with_client(config: &Config, client: Arc<dyn SummaryClient>) -> Self {
        Self::build(config, Some(client))
    }

    fn build(config: &Config, client: Option<Arc<dyn SummaryClient>>) -> Self {
        Self {
            mode: config.mode,
            token_threshold: config.token_threshold,
            max_file_bytes: config.max_file_bytes(),
            max_file_size_mb: config.max_file_size_mb,
            encodings: config.encodings.clone(),
            mock_delay: config.mock_delay(),
            retry: RetryPolicy::from_config(config),
            client,
        }
    }

    /// Read `file` and produce its outcome.
    pub async fn produce(&self, file: &DiscoveredFile) -> Outcome {
        if file.size > self.max_file_bytes {
            return self.oversized(file);
        }

        let bytes = match std::fs::read(&file.path) {
            Ok(bytes) => bytes,
            Err(source) => {
                return Outcome::Failed(CodectxError::Io {
                    path: file.path.clone(),
                    source,
                })
            }
        };

        let Some(content) = decode_text(&bytes, &self.encodings) else {
            debug!("{} is not decodable text, leaving it stale", file.relative_path);
            return Outcome::Undecodable;
        };

        let fingerprint = fingerprint_bytes(&bytes);
        if fingerprint != file.fingerprint {
            debug!("{} changed since discovery", file.relative_path);
        }

        self.summarize_content(&file.relative_path, &content, fingerprint)
            .await
    }

    /// Strategy selection for decoded `content` with its `fingerprint`.
    pub async fn summarize_content(&self, path: &str, content: &str, fingerprint: String) -> Outcome {
        let fingerprint = Some(fingerprint);
        let raw = |fingerprint| {
            Outcome::Produced(SummaryRecord::new(path, fingerprint, content, RecordKind::Raw))
        };

        if estimate_tokens(content) < self.token_threshold {
            return raw(fingerprint);
        }

        match self.mode {
            ProcessingMode::Copy => raw(fingerprint),
            ProcessingMode::Mock => {
                tokio::time::sleep(self.mock_delay).await;
                Outcome::Produced(SummaryRecord::new(
                    path,
                    fingerprint,
                    MOCK_SUMMARY,
                    RecordKind::Mock,
                ))
            }
            ProcessingMode::Remote => {
                let Some(client) = &self.client else {
                    return Outcome::Failed(CodectxError::config(
                        "remote mode without a summarization client",
                    ));
                };
                match self.retry.run(client.as_ref(), path, content).await {
                    Ok(text) => Outcome::Produced(SummaryRecord::new(
                        path,
                        fingerprint,
                        &text,
                        RecordKind::Generated,
                    )),
                    Err(e) => {
                        warn!("giving up on {}: {}", path, e);
                        Outcome::Failed(e.into())
                    }
                }
            }
        }
    }

    fn oversized(&self, file: &DiscoveredFile) -> Outcome {
        match sniff_prefix(file) {
            Ok(prefix) if looks_binary_bytes(&prefix) => return Outcome::Undecodable,
            Ok(_) => {}
            Err(source) => {
                return Outcome::Failed(CodectxError::Io {
                    path: file.path.clone(),
                    source,
                })
            }
        }

        let err = CodectxError::SizeLimit {
            path: file.relative_path.clone(),
            size_mb: file.size as f64 / (1024.0 * 1024.0),
            limit_mb: self.max_file_size_mb,
        };
        debug!("{}", err);
        Outcome::Produced(SummaryRecord::new(
            file.relative_path.as_str(),
            Some(file.fingerprint.clone()),
            &size_limit_body(file.size, self.max_file_size_mb),
            RecordKind::Skipped,
        ))
    }
}

fn sniff_prefix(file: &DiscoveredFile) -> std::io::Result<Vec<u8>> {
    let mut prefix = Vec::new();
    std::fs::File::open(&file.path)?
        .take(SNIFF_BYTES)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Diagnostic body stored for files above the size ceiling.
pub fn size_limit_body(size: u64, limit_mb: f64) -> String {
    format!(
        "File size ({:.1}MB) exceeds limit ({}MB)",
        size as f64 / (1024.0 * 1024.0),
        limit_mb
    )
}

/// Rough token count: whitespace-separated words plus a quarter of the chars.
pub fn estimate_tokens(content: &str) -> usize {
    content.split_whitespace().count() + content.chars().count() / 4
}

/// Decode with the first encoding that accepts the bytes and yields text.
///
/// Returns `None` when no encoding fits or the decoded text looks binary.
pub fn decode_text(bytes: &[u8], encodings: &[TextEncoding]) -> Option<String> {
    for encoding in encodings {
        let decoded = match encoding {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        };
        if let Some(text) = decoded {
            return (!looks_binary(&text)).then_some(text);
        }
    }
    None
}

/// NUL anywhere, or more than 10% control characters other than `\n\r\t`.
pub fn looks_binary(text: &str) -> bool {
    let mut total = 0usize;
    let mut control = 0usize;
    for c in text.chars() {
        if c == '\0' {
            return true;
        }
        total += 1;
        if (c as u32) < 32 && !matches!(c, '\n' | '\r' | '\t') {
            control += 1;
        }
    }
    control * 10 > total
}

fn looks_binary_bytes(bytes: &[u8]) -> bool {
    let text: String = bytes.iter().map(|&b| b as char).collect();
    looks_binary(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct AlwaysDown(AtomicU32);

    #[async_trait]
    impl SummaryClient for AlwaysDown {
        async fn summarize(&self, _path: &str, _content: &str) -> std::result::Result<String, RemoteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    struct Echo;

    #[async_trait]
    impl SummaryClient for Echo {
        async fn summarize(&self, path: &str, _content: &str) -> std::result::Result<String, RemoteError> {
            Ok(format!("- **Role**: summary of {}", path))
        }
    }

    fn config(mode: ProcessingMode) -> Config {
        let mut config = Config::for_root("/tmp");
        config.mode = mode;
        config.mock_delay_ms = 0;
        config.remote.backoff_base_ms = 1;
        config
    }

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> DiscoveredFile {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        DiscoveredFile {
            path,
            relative_path: name.to_string(),
            size: bytes.len() as u64,
            modified: chrono::Local::now(),
            fingerprint: fingerprint_bytes(bytes),
        }
    }

    fn large_source() -> String {
        "def handler(event, context):\n    return process(event)\n".repeat(200)
    }

    #[tokio::test]
    async fn small_file_is_raw() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "a.py", b"x = 1\n");
        let summarizer = Summarizer::from_config(&config(ProcessingMode::Mock)).unwrap();

        let record = summarizer.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.kind, Some(RecordKind::Raw));
        assert_eq!(record.body, "x = 1");
        assert_eq!(record.fingerprint.as_deref(), Some(file.fingerprint.as_str()));
    }

    #[tokio::test]
    async fn large_file_in_mock_mode_gets_placeholder() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "b.py", large_source().as_bytes());
        let summarizer = Summarizer::from_config(&config(ProcessingMode::Mock)).unwrap();

        let record = summarizer.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.kind, Some(RecordKind::Mock));
        assert_eq!(record.body, MOCK_SUMMARY);
    }

    #[tokio::test]
    async fn copy_mode_keeps_large_content() {
        let tmp = TempDir::new().unwrap();
        let source = large_source();
        let file = write(tmp.path(), "b.py", source.as_bytes());
        let summarizer = Summarizer::from_config(&config(ProcessingMode::Copy)).unwrap();

        let record = summarizer.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.kind, Some(RecordKind::Raw));
        assert_eq!(record.body, source.trim_end());
    }

    #[tokio::test]
    async fn binary_file_yields_no_record() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "blob.dat", b"\x00\x01\x02binary\x00");
        let summarizer = Summarizer::from_config(&config(ProcessingMode::Copy)).unwrap();
        assert!(matches!(summarizer.produce(&file).await, Outcome::Undecodable));
    }

    #[tokio::test]
    async fn utf8_only_rejects_latin1_bytes() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "legacy.txt", b"caf\xe9 au lait");

        let mut strict = config(ProcessingMode::Copy);
        strict.encodings = vec![TextEncoding::Utf8];
        let summarizer = Summarizer::from_config(&strict).unwrap();
        assert!(matches!(summarizer.produce(&file).await, Outcome::Undecodable));

        let lenient = Summarizer::from_config(&config(ProcessingMode::Copy)).unwrap();
        let record = lenient.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.body, "café au lait");
    }

    #[tokio::test]
    async fn oversized_file_gets_skipped_record() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "dump.txt", "line\n".repeat(1000).as_bytes());

        let mut cfg = config(ProcessingMode::Mock);
        cfg.max_file_size_mb = 0.001;
        let summarizer = Summarizer::from_config(&cfg).unwrap();

        let record = summarizer.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.kind, Some(RecordKind::Skipped));
        assert!(record.body.contains("exceeds limit (0.001MB)"));
        assert_eq!(record.fingerprint.as_deref(), Some(file.fingerprint.as_str()));
    }

    #[tokio::test]
    async fn remote_failure_yields_no_record_after_ceiling() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "b.py", large_source().as_bytes());
        let client = Arc::new(AlwaysDown(AtomicU32::new(0)));

        let mut cfg = config(ProcessingMode::Remote);
        cfg.remote.retry_attempts = 3;
        let summarizer = Summarizer::with_client(&cfg, client.clone());

        let outcome = summarizer.produce(&file).await;
        assert!(matches!(outcome, Outcome::Failed(CodectxError::Remote(_))));
        assert_eq!(client.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn remote_success_is_generated() {
        let tmp = TempDir::new().unwrap();
        let file = write(tmp.path(), "b.py", large_source().as_bytes());
        let summarizer = Summarizer::with_client(&config(ProcessingMode::Remote), Arc::new(Echo));

        let record = summarizer.produce(&file).await.record().cloned().unwrap();
        assert_eq!(record.kind, Some(RecordKind::Generated));
        assert_eq!(record.body, "- **Role**: summary of b.py");
    }

    #[test]
    fn remote_mode_without_key_is_config_error() {
        let err = Summarizer::from_config(&config(ProcessingMode::Remote)).err().unwrap();
        assert!(matches!(err, CodectxError::Config(_)));
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd efgh"), 2 + 2);
    }

    #[test]
    fn binary_heuristic() {
        assert!(!looks_binary("fn main() {\n\tprintln!(\"hi\");\r\n}"));
        assert!(looks_binary("text\0more"));
        assert!(looks_binary("\x01\x02\x03ab"));
        assert!(!looks_binary(""));
    }
}

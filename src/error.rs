//! Error taxonomy for a digest run.
//!
//! Only [`CodectxError::Config`] and [`CodectxError::Write`] are fatal to a
//! run. Every other variant is recovered where it occurs: the affected file
//! is reported, logged, and left stale for the next run.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodectxError>;

#[derive(Error, Debug)]
pub enum CodectxError {
    /// Bad root path, missing credential or endpoint, invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is binary or could not be decoded as text")]
    Decode(String),

    #[error("{path}: file size ({size_mb:.1}MB) exceeds limit ({limit_mb}MB)")]
    SizeLimit {
        path: String,
        size_mb: f64,
        limit_mb: f64,
    },

    #[error("remote summarization failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run interrupted before write-back")]
    Interrupted,
}

impl CodectxError {
    pub fn config(msg: impl Into<String>) -> Self {
        CodectxError::Config(msg.into())
    }

    /// True for errors that must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodectxError::Config(_) | CodectxError::Write { .. })
    }
}

/// Failure of a single call to the summarization service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no API key configured (set CODECTX_API_KEY or pass --api-key)")]
    MissingCredential,

    #[error("no API endpoint configured (set CODECTX_API_URL or pass --api-url)")]
    MissingEndpoint,
}

impl RemoteError {
    /// Configuration problems never consume the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RemoteError::MissingCredential | RemoteError::MissingEndpoint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!RemoteError::MissingCredential.is_retryable());
        assert!(!RemoteError::MissingEndpoint.is_retryable());
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Status {
            status: 404,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(CodectxError::config("bad root").is_fatal());
        assert!(!CodectxError::Decode("a.bin".into()).is_fatal());
        assert!(!CodectxError::Remote(RemoteError::Timeout).is_fatal());
    }
}

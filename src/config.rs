//! Run configuration.
//!
//! A [`Config`] is built once per run from defaults, an optional TOML file,
//! `CODECTX_*` environment variables, and CLI overrides (applied by the
//! binary), then validated and passed by reference to every stage.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CodectxError, Result};

/// Name of the optional per-project config file looked up under the root.
pub const CONFIG_FILE_NAME: &str = ".codectx.toml";

pub const DEFAULT_API_URL: &str = "https://codestral.mistral.ai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "codestral-latest";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a code analysis expert. Your task is to analyze the provided code file and create a concise, structured summary.

Format your response EXACTLY as follows:
- **Role**: Brief description of what this file does
- **Classes**: List main classes (or \"None\")
- **Global Functions**: List main functions (or \"None\")
- **Dependencies**: List main imports/dependencies (or \"None\")

Keep the summary concise and focused on the most important aspects.";

/// How stale files are turned into records.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Always store the raw file content.
    Copy,
    /// Store a fixed placeholder after a simulated delay.
    Mock,
    /// Call the summarization service for large files.
    Remote,
}

/// Text encodings tried, in order, when decoding file content.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Scan root. Never read from the file; set by the caller.
    #[serde(skip)]
    pub root: PathBuf,
    #[serde(default = "default_mode")]
    pub mode: ProcessingMode,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: f64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
    #[serde(default = "default_encodings")]
    pub encodings: Vec<TextEncoding>,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            system_prompt: None,
        }
    }
}

fn default_mode() -> ProcessingMode {
    ProcessingMode::Remote
}
fn default_output_file() -> PathBuf {
    PathBuf::from("codectx.md")
}
fn default_token_threshold() -> usize {
    200
}
fn default_max_file_size_mb() -> f64 {
    10.0
}
fn default_concurrency() -> usize {
    5
}
fn default_mock_delay_ms() -> u64 {
    500
}
fn default_encodings() -> Vec<TextEncoding> {
    vec![TextEncoding::Utf8, TextEncoding::Latin1]
}
fn default_api_url() -> Option<String> {
    Some(DEFAULT_API_URL.to_string())
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> f64 {
    30.0
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            mode: default_mode(),
            output_file: default_output_file(),
            token_threshold: default_token_threshold(),
            max_file_size_mb: default_max_file_size_mb(),
            concurrency: default_concurrency(),
            mock_delay_ms: default_mock_delay_ms(),
            encodings: default_encodings(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    /// Defaults rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Output document location, resolved against the scan root when relative.
    pub fn output_path(&self) -> PathBuf {
        if self.output_file.is_absolute() {
            self.output_file.clone()
        } else {
            self.root.join(&self.output_file)
        }
    }

    /// File name of the output document, used to keep it out of discovery.
    pub fn output_name(&self) -> Option<String> {
        self.output_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    }

    pub fn max_file_bytes(&self) -> u64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }

    pub fn system_prompt(&self) -> &str {
        self.remote
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Overlay `CODECTX_*` variables supplied by `lookup`.
    ///
    /// Takes a lookup function rather than reading the process environment
    /// directly so callers and tests control the source.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("CODECTX_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(url) = lookup("CODECTX_API_URL") {
            self.remote.api_url = Some(url);
        }
        if let Some(model) = lookup("CODECTX_MODEL") {
            self.remote.model = model;
        }
        if let Some(prompt) = lookup("CODECTX_CUSTOM_PROMPT") {
            self.remote.system_prompt = Some(prompt);
        }
        if let Some(name) = lookup("CODECTX_OUTPUT_FILENAME") {
            self.output_file = PathBuf::from(name);
        }
        if let Some(v) = lookup("CODECTX_API_TIMEOUT") {
            self.remote.timeout_secs = parse_env("CODECTX_API_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("CODECTX_API_RETRY_ATTEMPTS") {
            self.remote.retry_attempts = parse_env("CODECTX_API_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("CODECTX_TOKEN_THRESHOLD") {
            self.token_threshold = parse_env("CODECTX_TOKEN_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("CODECTX_CONCURRENT_REQUESTS") {
            self.concurrency = parse_env("CODECTX_CONCURRENT_REQUESTS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.retry_attempts < 1 {
            return Err(CodectxError::config("remote.retry_attempts must be >= 1"));
        }
        if !self.remote.timeout_secs.is_finite() || self.remote.timeout_secs <= 0.0 {
            return Err(CodectxError::config("remote.timeout_secs must be a finite number > 0"));
        }
        if !self.max_file_size_mb.is_finite() || self.max_file_size_mb <= 0.0 {
            return Err(CodectxError::config("max_file_size_mb must be a finite number > 0"));
        }
        if self.concurrency < 1 {
            return Err(CodectxError::config("concurrency must be >= 1"));
        }
        if self.encodings.is_empty() {
            return Err(CodectxError::config("encodings must not be empty"));
        }
        Ok(())
    }

    /// Credential and endpoint checks for a run that will call the service.
    pub fn validate_remote(&self) -> Result<()> {
        if self.mode != ProcessingMode::Remote {
            return Ok(());
        }
        if self.remote.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(CodectxError::config(
                "API key required for remote summarization. Set CODECTX_API_KEY or pass \
                 --api-key. Use --mode mock for testing without API calls.",
            ));
        }
        if self.remote.api_url.as_deref().map_or(true, str::is_empty) {
            return Err(CodectxError::config(
                "API endpoint required for remote summarization. Set CODECTX_API_URL or \
                 pass --api-url.",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CodectxError::config(format!("{} has an invalid value: '{}'", name, value)))
}

/// Load configuration for `root`.
///
/// Reads `explicit` when given (it must exist), otherwise `<root>/.codectx.toml`
/// when present, otherwise starts from defaults. Environment overrides are
/// applied afterwards by the caller.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config> {
    let candidate = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let implicit = root.join(CONFIG_FILE_NAME);
            implicit.is_file().then_some(implicit)
        }
    };

    let mut config = match candidate {
        Some(path) => {
            let content =
                std::fs::read_to_string(&path).map_err(|source| CodectxError::Io {
                    path: path.clone(),
                    source,
                })?;
            toml::from_str::<Config>(&content).map_err(|e| {
                CodectxError::config(format!(
                    "failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?
        }
        None => Config::default(),
    };
    config.root = root.to_path_buf();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.token_threshold, 200);
        assert_eq!(config.remote.retry_attempts, 3);
        assert_eq!(config.mode, ProcessingMode::Remote);
    }

    #[test]
    fn loads_project_file_from_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            r#"
mode = "mock"
token_threshold = 50
mock_delay_ms = 0
encodings = ["utf-8"]

[remote]
retry_attempts = 5
"#,
        )
        .unwrap();

        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config.mode, ProcessingMode::Mock);
        assert_eq!(config.token_threshold, 50);
        assert_eq!(config.mock_delay_ms, 0);
        assert_eq!(config.encodings, vec![TextEncoding::Utf8]);
        assert_eq!(config.remote.retry_attempts, 5);
        assert_eq!(config.remote.model, DEFAULT_MODEL);
        assert_eq!(config.root, tmp.path());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "colour_output = true\n").unwrap();
        let err = load_config(tmp.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, CodectxError::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("CODECTX_API_KEY", "secret"),
            ("CODECTX_TOKEN_THRESHOLD", "42"),
            ("CODECTX_OUTPUT_FILENAME", "digest.md"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.remote.api_key.as_deref(), Some("secret"));
        assert_eq!(config.token_threshold, 42);
        assert_eq!(config.output_name().as_deref(), Some("digest.md"));
    }

    #[test]
    fn bad_env_number_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|name| (name == "CODECTX_API_RETRY_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, CodectxError::Config(_)));
    }

    #[test]
    fn validation_rejects_zero_retries() {
        let mut config = Config::default();
        config.remote.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_finite_limits() {
        let mut config = Config::default();
        config
            .apply_env(|name| (name == "CODECTX_API_TIMEOUT").then(|| "inf".to_string()))
            .unwrap();
        assert!(config.remote.timeout_secs.is_infinite());
        assert!(matches!(config.validate(), Err(CodectxError::Config(_))));

        let mut config = Config::default();
        config.max_file_size_mb = f64::INFINITY;
        assert!(matches!(config.validate(), Err(CodectxError::Config(_))));

        config.max_file_size_mb = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn remote_mode_requires_credential() {
        let mut config = Config::default();
        assert!(config.validate_remote().is_err());

        config.remote.api_key = Some("k".to_string());
        config.validate_remote().unwrap();

        config.remote.api_url = None;
        assert!(config.validate_remote().is_err());

        config.mode = ProcessingMode::Mock;
        config.validate_remote().unwrap();
    }

    #[test]
    fn relative_output_resolves_against_root() {
        let config = Config::for_root("/srv/project");
        assert_eq!(config.output_path(), PathBuf::from("/srv/project/codectx.md"));
    }
}

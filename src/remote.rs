//! Summarization service client.
//!
//! [`SummaryClient`] is the seam between the adapter and the network: one
//! call, one attempt. [`RetryPolicy`] wraps any client with bounded retries
//! and exponential backoff. [`HttpSummaryClient`] speaks the
//! chat-completions protocol over `reqwest`.
//!
//! # Retry Strategy
//!
//! - Timeouts, connection failures, any non-2xx status and malformed
//!   bodies are retried.
//! - A missing credential or endpoint fails at once.
//! - Delay before retry `k` is `base × 2^(k-1)`, exponent capped at 5.
//! - Only the last attempt's error is returned.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RemoteError;

/// Single-attempt access to a summarization backend.
#[async_trait]
pub trait SummaryClient: Send + Sync {
    /// Summarize `content`, known to the caller as `path`.
    async fn summarize(&self, path: &str, content: &str) -> Result<String, RemoteError>;
}

/// Attempt ceiling and backoff base for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.remote.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.remote.backoff_base_ms),
        }
    }

    /// Delay slept before attempt number `attempt` (0-based; 0 has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    /// Call `client` until it succeeds, fails non-retryably, or the ceiling is hit.
    pub async fn run(
        &self,
        client: &dyn SummaryClient,
        path: &str,
        content: &str,
    ) -> Result<String, RemoteError> {
        let mut last_err = None;

        for attempt in 0..self.attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.delay_before(attempt)).await;
            }

            match client.summarize(path, content).await {
                Ok(text) => {
                    if attempt > 0 {
                        debug!("{} summarized after {} attempts", path, attempt + 1);
                    }
                    return Ok(text);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        self.attempts,
                        path,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            RemoteError::Connect("summarization failed after retries".to_string())
        }))
    }
}

/// Chat-completions client (`POST {api_url}` with a bearer token).
pub struct HttpSummaryClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl HttpSummaryClient {
    /// Build a client from `config`.
    ///
    /// # Errors
    ///
    /// [`RemoteError::MissingCredential`] or [`RemoteError::MissingEndpoint`]
    /// when either is absent; a client that cannot be constructed maps to
    /// [`RemoteError::Connect`].
    pub fn new(config: &Config) -> Result<Self, RemoteError> {
        let api_key = config
            .remote
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(RemoteError::MissingCredential)?;
        let api_url = config
            .remote
            .api_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(RemoteError::MissingEndpoint)?;

        let timeout = Duration::try_from_secs_f64(config.remote.timeout_secs)
            .map_err(|e| RemoteError::Connect(format!("invalid timeout: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.remote.model.clone(),
            system_prompt: config.system_prompt().to_string(),
        })
    }

    fn request_body(&self, path: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": user_prompt(path, content) },
            ],
            "temperature": 0.1,
            "max_tokens": 500,
        })
    }
}

#[async_trait]
impl SummaryClient for HttpSummaryClient {
    async fn summarize(&self, path: &str, content: &str) -> Result<String, RemoteError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(path, content))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;
        let text = parse_completion(&json)?;
        Ok(strip_echoed_header(path, &text))
    }
}

fn map_transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Connect(e.to_string())
    }
}

/// The user message sent for `path`.
pub fn user_prompt(path: &str, content: &str) -> String {
    format!(
        "Please analyze this code file and provide a structured summary.\n\nFile: {}\n\nContent:\n```\n{}\n```",
        path, content
    )
}

/// Extract `choices[0].message.content` from a completion response.
pub fn parse_completion(json: &serde_json::Value) -> Result<String, RemoteError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            RemoteError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

/// Drop a leading `## File: <path>` or `## <path>` line the model echoed back.
pub fn strip_echoed_header(path: &str, text: &str) -> String {
    let trimmed = text.trim_start();
    let echoes = [format!("## File: {}", path), format!("## {}", path)];
    for echo in &echoes {
        if let Some(rest) = trimmed.strip_prefix(echo.as_str()) {
            if let Some(nl) = rest.find('\n') {
                if rest[..nl].trim().is_empty() || rest[..nl].trim_start().starts_with('(') {
                    return rest[nl + 1..].trim().to_string();
                }
            } else if rest.trim().is_empty() {
                return String::new();
            }
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then echoes a summary.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: RemoteError,
    }

    impl Flaky {
        fn new(failures: u32, error: RemoteError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl SummaryClient for Flaky {
        async fn summarize(&self, path: &str, _content: &str) -> Result<String, RemoteError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(format!("summary of {}", path))
            }
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn exhausts_exactly_the_ceiling() {
        let client = Flaky::new(u32::MAX, RemoteError::Timeout);
        let err = fast(4).run(&client, "a.py", "x").await.unwrap_err();
        assert_eq!(err, RemoteError::Timeout);
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let client = Flaky::new(1, RemoteError::Connect("refused".into()));
        let text = fast(3).run(&client, "a.py", "x").await.unwrap();
        assert_eq!(text, "summary of a.py");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_credential_is_not_retried() {
        let client = Flaky::new(u32::MAX, RemoteError::MissingCredential);
        let err = fast(5).run(&client, "a.py", "x").await.unwrap_err();
        assert_eq!(err, RemoteError::MissingCredential);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            attempts: 10,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(9), Duration::from_millis(3200));
    }

    #[test]
    fn client_requires_key_and_url() {
        let mut config = Config::default();
        assert!(matches!(
            HttpSummaryClient::new(&config),
            Err(RemoteError::MissingCredential)
        ));
        config.remote.api_key = Some("k".into());
        config.remote.api_url = None;
        assert!(matches!(
            HttpSummaryClient::new(&config),
            Err(RemoteError::MissingEndpoint)
        ));
    }

    #[test]
    fn parse_completion_shapes() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "  - **Role**: x \n"}}]});
        assert_eq!(parse_completion(&ok).unwrap(), "- **Role**: x");

        let empty = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_completion(&empty),
            Err(RemoteError::MalformedResponse(_))
        ));
    }

    #[test]
    fn strips_echoed_headers() {
        assert_eq!(
            strip_echoed_header("src/a.py", "## File: src/a.py\n\n- **Role**: x"),
            "- **Role**: x"
        );
        assert_eq!(
            strip_echoed_header("src/a.py", "## File: src/a.py (SUMMARY)\n- **Role**: x"),
            "- **Role**: x"
        );
        assert_eq!(
            strip_echoed_header("src/a.py", "## src/a.py\n- **Role**: x"),
            "- **Role**: x"
        );
        assert_eq!(
            strip_echoed_header("src/a.py", "- **Role**: x\n## File: src/a.py"),
            "- **Role**: x\n## File: src/a.py"
        );
        assert_eq!(
            strip_echoed_header("src/a.py", "## src/a.pyc notes\nbody"),
            "## src/a.pyc notes\nbody"
        );
    }

    #[test]
    fn request_carries_model_and_prompts() {
        let mut config = Config::default();
        config.remote.api_key = Some("k".into());
        config.remote.model = "tiny".into();
        let client = HttpSummaryClient::new(&config).unwrap();
        let body = client.request_body("a.py", "print(1)");
        assert_eq!(body["model"], "tiny");
        assert_eq!(body["messages"][0]["role"], "system");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("File: a.py"));
        assert!(user.contains("print(1)"));
    }

    #[test]
    fn unrepresentable_timeout_is_an_error() {
        let mut config = Config::default();
        config.remote.api_key = Some("k".into());
        config.remote.timeout_secs = f64::INFINITY;
        assert!(matches!(
            HttpSummaryClient::new(&config),
            Err(RemoteError::Connect(_))
        ));
    }
}

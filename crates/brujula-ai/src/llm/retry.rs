//! Retry policy for provider HTTP calls.

use std::time::Duration;

use reqwest::Response;

use crate::error::AiError;

/// Providers occasionally return error pages far larger than anything
/// worth logging; bodies are clipped to this many bytes.
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Backoff policy for transient provider failures.
///
/// The delay doubles per retry up to `max_delay`; a `Retry-After` sent by
/// the provider always wins over the computed backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the initial request included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before the given retry (1 = first retry).
    pub fn backoff(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay;
        }
        let doublings = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << doublings)
            .min(self.max_delay)
    }
}

/// Convert a non-success provider response into [`AiError::LlmHttp`],
/// carrying the status, a clipped body, and any `Retry-After` hint.
pub async fn error_from_response(provider: &str, response: Response) -> AiError {
    let status = response.status().as_u16();
    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    AiError::LlmHttp {
        provider: provider.to_string(),
        status,
        message: clip_error_body(&body),
        retry_after_secs,
    }
}

/// Clip an oversized error body to the log budget without splitting a
/// multibyte UTF-8 sequence: the cut backs up to the nearest char boundary.
fn clip_error_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

//! Shared HTTP plumbing: POST a JSON body with bounded retries

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, warn};

use super::LlmError;

/// Maximum number of retries for transient errors
pub(crate) const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
pub(crate) const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff before retry `attempt` (1-based)
pub(crate) fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt.saturating_sub(1)))
}

/// POST `body` to `url`, retrying network errors and retryable statuses
///
/// A 429 is surfaced immediately as `RateLimited`; the caller decides what a
/// rate limit costs. Any other non-success status becomes `ApiError`.
pub(crate) async fn post_json(
    http: &Client,
    url: &str,
    headers: &[(&'static str, String)],
    body: &serde_json::Value,
    is_retryable_status: fn(u16) -> bool,
) -> Result<Response, LlmError> {
    debug!(%url, "post_json: called");
    let mut last_error = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let backoff = backoff_for(attempt);
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "post_json: retrying after transient error"
            );
            tokio::time::sleep(backoff).await;
        }

        let mut builder = http.post(url).header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }

        let response = match builder.json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(attempt, error = %e, "post_json: network error");
                last_error = Some(LlmError::Network(e));
                continue;
            }
        };

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            debug!(retry_after, "post_json: rate limited (429)");
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if is_retryable_status(status) && attempt < MAX_RETRIES {
            let text = response.text().await.unwrap_or_default();
            debug!(attempt, status, "post_json: retryable error");
            last_error = Some(LlmError::ApiError { status, message: text });
            continue;
        }

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status, "post_json: API error");
            return Err(LlmError::ApiError { status, message: text });
        }

        return Ok(response);
    }

    Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
}

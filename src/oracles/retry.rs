use anyhow::{Result, anyhow};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const BUSY_MAX_RETRIES: usize = 4;
pub(crate) const BUSY_BASE_DELAY: Duration = Duration::from_secs(1);
pub(crate) const BUSY_MAX_DELAY: Duration = Duration::from_secs(20);

/// Whether the oracle asked us to come back later (rate limit, overloaded
/// accelerator, model still loading).
pub(crate) fn is_busy(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return true;
    }
    if status.as_u16() == 529 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("overloaded")
        || lower.contains("out of memory")
        || lower.contains("model is loading")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn wait_with_backoff(
    oracle: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = match retry_after {
        Some(retry_after) if retry_after > delay => retry_after.min(BUSY_MAX_DELAY),
        _ => delay,
    };
    warn!(
        "{} busy; retrying in {:.1}s (attempt {}/{})",
        oracle,
        wait.as_secs_f32(),
        attempt,
        BUSY_MAX_RETRIES
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let next = current.saturating_mul(2).max(BUSY_BASE_DELAY);
    next.min(BUSY_MAX_DELAY)
}

/// POSTs `body` as JSON and returns the response text, retrying while the
/// oracle reports it is busy. `describe_error` turns an error body into a
/// readable message.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    oracle: &str,
    url: &str,
    bearer: Option<&str>,
    body: &B,
    describe_error: fn(&str) -> Option<String>,
) -> Result<String> {
    let mut attempt = 0usize;
    let mut delay = BUSY_BASE_DELAY;
    loop {
        attempt += 1;
        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(text);
        }
        if is_busy(status, &text) && attempt < BUSY_MAX_RETRIES {
            delay = wait_with_backoff(oracle, attempt, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!(
            "{} error ({}): {}",
            oracle,
            status,
            describe_error(&text).unwrap_or(text)
        ));
    }
}

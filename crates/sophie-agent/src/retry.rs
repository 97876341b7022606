//! Declared retry policy for the completion client.
//!
//! The policy (attempt count + backoff function) is data, not control
//! flow: `delay_for` is independently testable and `RetryingCompleter`
//! wraps any `CompletionProvider` without that provider knowing about
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::provider::{CompletionError, CompletionProvider, CompletionRequest};

/// Linear backoff: attempt n (1-based) sleeps `n * base_delay` before the
/// next attempt, so inter-attempt delay strictly increases.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay inserted after a failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Wraps a completion provider with bounded retry.
///
/// Transient failures (timeout, rate limit, 5xx) are retried with the
/// same payload up to `max_attempts` total attempts; the last error is
/// surfaced when attempts are exhausted. Permanent failures — including
/// an empty user message, rejected before the first attempt — surface
/// immediately.
pub struct RetryingCompleter {
    inner: Box<dyn CompletionProvider>,
    policy: RetryPolicy,
}

impl RetryingCompleter {
    pub fn new(inner: Box<dyn CompletionProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CompletionProvider for RetryingCompleter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, CompletionError> {
        // Malformed input: the final message must be a non-empty user turn.
        let malformed = req
            .messages
            .last()
            .map(|m| m.content.trim().is_empty())
            .unwrap_or(true);
        if malformed {
            return Err(CompletionError::EmptyMessage);
        }

        let mut last_err: Option<CompletionError> = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.inner.complete(req).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!(
                            provider = %self.inner.name(),
                            attempt,
                            "completion succeeded after retry"
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        err = %e,
                        "completion attempt failed"
                    );

                    if !e.is_transient() {
                        return Err(e);
                    }
                    last_err = Some(e);

                    if attempt < self.policy.max_attempts {
                        // A rate-limit response carries the server's wait
                        // time; treat it as a floor on the backoff delay.
                        let mut delay = self.policy.delay_for(attempt);
                        if let Some(CompletionError::RateLimited { retry_after_ms }) = &last_err {
                            delay = delay.max(Duration::from_millis(*retry_after_ms));
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(CompletionError::Parse(
            "retry loop exited without an error".to_string(),
        )))
    }
}

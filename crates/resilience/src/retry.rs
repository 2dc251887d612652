//! Retry helper with deterministic capped exponential backoff.

use std::{future::Future, time::Duration};

use {serde::Deserialize, tracing::warn};

/// Error-message fragments treated as transient by default: timeouts,
/// connectivity, rate limits, and 5xx-style failures.
const DEFAULT_RETRYABLE: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "rate limit",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
    "temporarily",
];

/// Backoff policy. Delays are deterministic given the attempt number:
/// `min(initial_delay * backoff_multiplier^attempt, max_delay)`, no jitter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Case-insensitive substrings that mark an error as retryable.
    pub retryable_errors: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            retryable_errors: DEFAULT_RETRYABLE.iter().map(|s| (*s).into()).collect(),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the failed attempt number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let raw = initial * self.backoff_multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn is_retryable(&self, err: &anyhow::Error) -> bool {
        // `{:#}` renders the whole error chain, so a wrapped reqwest timeout
        // still matches.
        let message = format!("{err:#}").to_lowercase();
        self.retryable_errors
            .iter()
            .any(|pattern| message.contains(&pattern.to_lowercase()))
    }
}

/// Run `op` up to `max_retries + 1` times, sleeping the policy's backoff
/// between attempts. Non-retryable errors and the final failure are
/// re-thrown as-is; nothing is swallowed.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !policy.is_retryable(&err) {
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    operation = label,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            },
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn delays_grow_exponentially_up_to_the_cap() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        // 400ms raw, capped at 350ms.
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn classification_matches_the_error_chain() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&anyhow::anyhow!("request timed out")));
        assert!(policy.is_retryable(&anyhow::anyhow!("HTTP 503 Service Unavailable")));
        assert!(policy.is_retryable(
            &anyhow::anyhow!("network unreachable").context("probing mercadolibre")
        ));
        assert!(!policy.is_retryable(&anyhow::anyhow!("invalid credentials")));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_success_after_transient_failures() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let start = tokio::time::Instant::now();
        let value = retry_with_backoff(&policy, "test", move || {
            let calls = Arc::clone(&calls2);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two failures slept 100ms + 200ms under the paused clock.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_throw_on_the_first_attempt() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let err = retry_with_backoff(&policy, "test", move || {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("401 bad credentials"))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("bad credentials"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_rethrows_the_last_error() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);

        let err = retry_with_backoff(&policy, "test", move || {
            let calls = Arc::clone(&calls2);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("timeout on attempt {n}"))
            }
        })
        .await
        .unwrap_err();

        // Initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("attempt 3"));
    }
}

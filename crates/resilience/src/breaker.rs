//! Failure-counting circuit breaker.

use std::{future::Future, sync::Mutex, time::Duration};

use {
    serde::Serialize,
    tokio::time::Instant,
    tracing::{info, warn},
};

/// Error returned without invoking the wrapped operation while the breaker
/// is open.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker '{name}' is open, next attempt in {retry_in_ms}ms")]
pub struct CircuitOpen {
    pub name: String,
    pub retry_in_ms: u64,
}

/// Breaker tuning. The defaults match the platform adapters' needs; the
/// config crate exposes them as `[resilience]` keys.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Failures within the monitoring window before the breaker trips.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe call.
    pub reset_timeout: Duration,
    /// Failures older than this no longer count toward the threshold.
    pub monitoring_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

/// Point-in-time breaker snapshot for diagnostics.
#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub next_attempt: Option<Instant>,
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
}

/// Circuit breaker guarding one downstream dependency.
///
/// The open → half-open transition is lazy: it happens on the next call once
/// the reset timeout has elapsed, there is no timer.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    // std Mutex: held only for state bookkeeping, never across an await.
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                next_attempt: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` through the breaker. While open, fails with [`CircuitOpen`]
    /// without invoking `op`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.before_call()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            },
            Err(err) => {
                self.on_failure();
                Err(err)
            },
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.lock();
        BreakerMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure,
            next_attempt: inner.next_attempt,
        }
    }

    /// Force the breaker back to closed, clearing all failure bookkeeping.
    pub fn manual_reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.next_attempt = None;
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    fn before_call(&self) -> Result<(), anyhow::Error> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            BreakerState::Open => {
                let next = inner.next_attempt.unwrap_or(now);
                if now >= next {
                    inner.state = BreakerState::HalfOpen;
                    info!(breaker = %self.name, "circuit breaker half-open, probing");
                    Ok(())
                } else {
                    let retry_in_ms = next.duration_since(now).as_millis() as u64;
                    Err(CircuitOpen {
                        name: self.name.clone(),
                        retry_in_ms,
                    }
                    .into())
                }
            },
            BreakerState::Closed => {
                // Sliding window: stale failures stop counting.
                if let Some(last) = inner.last_failure
                    && now.duration_since(last) >= self.config.monitoring_window
                {
                    inner.failure_count = 0;
                    inner.last_failure = None;
                }
                Ok(())
            },
            BreakerState::HalfOpen => Ok(()),
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            info!(breaker = %self.name, "circuit breaker closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.next_attempt = None;
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        let now = Instant::now();

        if let Some(last) = inner.last_failure
            && now.duration_since(last) >= self.config.monitoring_window
        {
            inner.failure_count = 0;
        }
        inner.failure_count += 1;
        inner.last_failure = Some(now);

        let tripped = inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if tripped {
            inner.state = BreakerState::Open;
            inner.next_attempt = Some(now + self.config.reset_timeout);
            warn!(
                breaker = %self.name,
                failure_count = inner.failure_count,
                reset_timeout_secs = self.config.reset_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-bookkeeping; the counters are
        // still usable, so recover the guard.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use super::*;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .execute(|| async { Err::<(), _>(anyhow::anyhow!("connection refused")) })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_fails_fast_without_invoking() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let err = breaker
            .execute(|| async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0, "wrapped fn must not run");
        assert!(err.downcast_ref::<CircuitOpen>().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes_and_resets_count() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        let result = breaker.execute(|| async { Ok::<_, anyhow::Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        let metrics = breaker.metrics();
        assert_eq!(metrics.state, BreakerState::Closed);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        // And the fresh open period holds again.
        let err = breaker
            .execute(|| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<CircuitOpen>().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_failures_fall_out_of_the_window() {
        let breaker = CircuitBreaker::new("test", test_config());
        fail(&breaker).await;
        fail(&breaker).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&breaker).await;

        let metrics = breaker.metrics();
        assert_eq!(metrics.state, BreakerState::Closed);
        assert_eq!(metrics.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reset_closes_an_open_breaker() {
        let breaker = CircuitBreaker::new("test", test_config());
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        breaker.manual_reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        let result = breaker.execute(|| async { Ok::<_, anyhow::Error>(1) }).await;
        assert!(result.is_ok());
    }
}

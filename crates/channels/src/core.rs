//! Shared adapter internals: status cell, event emission, resilience
//! wrapper, and the polling-loop scaffold.
//!
//! Concrete adapters embed [`AdapterCore`] instead of inheriting from a base
//! class: the core owns everything platform-independent and the adapter
//! keeps its own client/browser state next to it.

use std::{
    future::Future,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    botline_common::types::{
        AuthPrompt, ConnectionStatus, PlatformConnectionConfig, PlatformType,
    },
    botline_resilience::{CircuitBreaker, CircuitOpen, RetryPolicy, retry_with_backoff},
};

use crate::{
    adapter::{AdapterEvent, EventSender},
    error::{Error, Result},
};

pub struct AdapterCore {
    connection_id: String,
    platform: PlatformType,
    status: RwLock<ConnectionStatus>,
    events: EventSender,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    last_config: RwLock<Option<PlatformConnectionConfig>>,
    poll_cancel: RwLock<CancellationToken>,
}

impl AdapterCore {
    pub fn new(
        connection_id: impl Into<String>,
        platform: PlatformType,
        events: EventSender,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            platform,
            status: RwLock::new(ConnectionStatus::Disconnected),
            events,
            breaker,
            retry,
            last_config: RwLock::new(None),
            poll_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn platform(&self) -> PlatformType {
        self.platform
    }

    pub fn status(&self) -> ConnectionStatus {
        *read(&self.status)
    }

    /// Transition the status machine. No-op transitions do not re-emit:
    /// every `Status` event on the channel is a real change.
    pub fn set_status(&self, to: ConnectionStatus) -> bool {
        let from = {
            let mut status = write(&self.status);
            let from = *status;
            if from == to {
                return false;
            }
            *status = to;
            from
        };
        info!(
            connection_id = %self.connection_id,
            platform = %self.platform,
            from = %from,
            to = %to,
            "connection status changed"
        );
        self.emit(AdapterEvent::Status { from, to });
        true
    }

    /// Fire-and-forget event emission; a closed receiver is ignored.
    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.events.send(event);
    }

    /// Enter `authenticating` and surface the out-of-band hint.
    pub fn emit_auth_prompt(&self, prompt: AuthPrompt) {
        self.set_status(ConnectionStatus::Authenticating);
        self.emit(AdapterEvent::Authenticating { prompt });
    }

    pub fn emit_error(&self, message: impl Into<String>) {
        self.emit(AdapterEvent::Error {
            message: message.into(),
        });
    }

    /// Keep the config for auto-recovery on a later send.
    pub fn remember_config(&self, config: &PlatformConnectionConfig) {
        *write(&self.last_config) = Some(config.clone());
    }

    pub fn last_config(&self) -> Option<PlatformConnectionConfig> {
        read(&self.last_config).clone()
    }

    pub fn ensure_connected(&self) -> Result<()> {
        if self.status() == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(Error::not_connected(self.platform))
        }
    }

    /// Run `op` with retry/backoff inside the platform's circuit breaker.
    ///
    /// The breaker sees one failure per exhausted retry sequence, not one
    /// per attempt.
    pub async fn guarded<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let retry = &self.retry;
        let result = self
            .breaker
            .execute(|| retry_with_backoff(retry, label, || op()))
            .await;

        result.map_err(|err| match err.downcast::<CircuitOpen>() {
            Ok(open) => Error::unavailable(open),
            Err(other) => Error::external(label, other),
        })
    }

    /// Replace the polling token, cancelling any previous loop.
    pub fn begin_polling(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = {
            let mut cancel = write(&self.poll_cancel);
            std::mem::replace(&mut *cancel, token.clone())
        };
        previous.cancel();
        token
    }

    pub fn stop_polling(&self) {
        read(&self.poll_cancel).cancel();
    }
}

/// Spawn a fixed-interval polling task.
///
/// A failed tick is logged and the schedule continues; only cancellation
/// stops the loop. Connection-level failures are the adapter's business —
/// it transitions status itself.
pub fn spawn_poll_loop<F, Fut>(
    connection_id: String,
    platform: PlatformType,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(connection_id, platform = %platform, period_secs = period.as_secs(), "polling started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(connection_id, platform = %platform, "polling stopped");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(e) = tick().await {
                        warn!(
                            connection_id,
                            platform = %platform,
                            error = %e,
                            "poll tick failed"
                        );
                    }
                }
            }
        }
    })
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    botline_channels::{ConnectionStore, error::Error},
    botline_common::types::ConnectionStatus,
    botline_gateway::PlatformManager,
};

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Connections whose last sync is older than this are expired.
    pub max_session_age: chrono::Duration,
    pub sweep_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_session_age: chrono::Duration::days(7),
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl From<&botline_config::schema::SessionsSection> for SweepConfig {
    fn from(cfg: &botline_config::schema::SessionsSection) -> Self {
        Self {
            max_session_age: chrono::Duration::days(cfg.max_session_age_days),
            sweep_interval: Duration::from_secs(cfg.sweep_interval_secs),
        }
    }
}

/// Periodic sweep over persisted connections.
///
/// Both passes operate on a snapshot of the connection list and are safe to
/// run concurrently with live traffic.
pub struct SessionSweeper {
    manager: Arc<PlatformManager>,
    connections: Arc<dyn ConnectionStore>,
    config: SweepConfig,
}

impl SessionSweeper {
    pub fn new(
        manager: Arc<PlatformManager>,
        connections: Arc<dyn ConnectionStore>,
        config: SweepConfig,
    ) -> Self {
        Self {
            manager,
            connections,
            config,
        }
    }

    /// A session is valid when its record exists, its last sync is within
    /// the age threshold, and a live adapter reports connected.
    pub async fn validate_session(&self, connection_id: &str) -> bool {
        let record = match self.connections.get(connection_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(err) => {
                warn!(connection_id, error = %err, "failed to load connection record");
                return false;
            },
        };

        if Utc::now() - record.last_sync_at > self.config.max_session_age {
            return false;
        }
        self.manager.is_connected(connection_id).await
    }

    /// Disconnect connections persisted as live whose last sync is past the
    /// threshold. Returns how many were expired.
    pub async fn expire_old_sessions(&self) -> anyhow::Result<usize> {
        let candidates = self
            .connections
            .list_with_status(&[ConnectionStatus::Connected, ConnectionStatus::Connecting])
            .await?;
        let cutoff = Utc::now() - self.config.max_session_age;

        let mut expired = 0;
        for record in candidates {
            if record.last_sync_at >= cutoff {
                continue;
            }
            info!(
                connection_id = record.id,
                platform = %record.platform,
                last_sync_at = %record.last_sync_at,
                "expiring stale session"
            );
            match self.manager.disconnect_platform(&record.id).await {
                Ok(()) => {},
                // No live adapter behind the record; correct it directly.
                Err(Error::AdapterNotFound { .. }) => {
                    self.connections
                        .update_status(&record.id, ConnectionStatus::Disconnected)
                        .await?;
                },
                Err(err) => {
                    warn!(connection_id = record.id, error = %err, "failed to expire session");
                    continue;
                },
            }
            expired += 1;
        }
        Ok(expired)
    }

    /// Fix records persisted as live with no adapter in the registry (e.g.
    /// after a process restart). Returns how many were corrected.
    pub async fn cleanup_orphaned_sessions(&self) -> anyhow::Result<usize> {
        let candidates = self
            .connections
            .list_with_status(&[ConnectionStatus::Connected, ConnectionStatus::Connecting])
            .await?;

        let mut cleaned = 0;
        for record in candidates {
            if self.manager.is_registered(&record.id).await {
                continue;
            }
            warn!(
                connection_id = record.id,
                platform = %record.platform,
                "orphaned session, correcting persisted status"
            );
            self.connections
                .update_status(&record.id, ConnectionStatus::Disconnected)
                .await?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    /// Run both sweeps on a fixed interval until cancelled. A failed pass is
    /// logged and the schedule continues.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.config.sweep_interval;
            let start = tokio::time::Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "session sweeper started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("session sweeper stopped");
                        break;
                    }
                    _ = timer.tick() => self.run_once().await,
                }
            }
        })
    }

    async fn run_once(&self) {
        match self.expire_old_sessions().await {
            Ok(expired) if expired > 0 => info!(expired, "expired stale sessions"),
            Ok(_) => {},
            Err(err) => warn!(error = %err, "session expiry sweep failed"),
        }
        match self.cleanup_orphaned_sessions().await {
            Ok(cleaned) if cleaned > 0 => info!(cleaned, "corrected orphaned sessions"),
            Ok(_) => {},
            Err(err) => warn!(error = %err, "orphan cleanup sweep failed"),
        }
    }
}

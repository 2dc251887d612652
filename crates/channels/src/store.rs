use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::Serialize,
};

use botline_common::types::{ConnectionStatus, PlatformType};

/// A persisted platform connection record.
///
/// Persistence itself is an external collaborator; the core only reads and
/// updates status/sync bookkeeping through [`ConnectionStore`].
#[derive(Debug, Clone, Serialize)]
pub struct StoredConnection {
    pub id: String,
    pub tenant_id: String,
    pub chatbot_id: String,
    pub platform: PlatformType,
    pub status: ConnectionStatus,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Persistent storage for connection records.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get(&self, connection_id: &str) -> anyhow::Result<Option<StoredConnection>>;

    /// Connections currently persisted with any of the given statuses.
    async fn list_with_status(
        &self,
        statuses: &[ConnectionStatus],
    ) -> anyhow::Result<Vec<StoredConnection>>;

    async fn update_status(
        &self,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> anyhow::Result<()>;

    /// Bump `last_sync_at` to now.
    async fn touch_sync(&self, connection_id: &str) -> anyhow::Result<()>;
}

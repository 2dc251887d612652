//! Sweeper behavior against an in-memory connection store and a fake
//! adapter stack.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {async_trait::async_trait, chrono::Utc};

use {
    botline_channels::{
        ConnectionStore, EventSender, PlatformAdapter, StoredConnection,
        error::Result,
    },
    botline_common::types::{
        ConnectionStatus, PlatformChat, PlatformConnectionConfig, PlatformCredentials,
        PlatformMessage, PlatformType, SendOptions,
    },
    botline_gateway::{
        AdapterFactory, NoopConversationStore, NoopNotifier, NoopResponseGenerator,
        PlatformManager,
    },
    botline_sessions::{SessionSweeper, SweepConfig},
};

// ── Minimal fakes ───────────────────────────────────────────────────────────

struct IdleAdapter {
    connection_id: String,
    status: Mutex<ConnectionStatus>,
}

#[async_trait]
impl PlatformAdapter for IdleAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::WhatsappWeb
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    async fn connect(&self, _config: &PlatformConnectionConfig) -> Result<()> {
        *self.status.lock().unwrap() = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.status.lock().unwrap() = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn send_message(
        &self,
        _chat_id: &str,
        _content: &str,
        _options: Option<SendOptions>,
    ) -> Result<PlatformMessage> {
        unimplemented!("not exercised by the sweeper")
    }

    async fn get_chats(&self) -> Result<Vec<PlatformChat>> {
        Ok(Vec::new())
    }

    async fn get_messages(&self, _chat_id: &str, _limit: usize) -> Result<Vec<PlatformMessage>> {
        Ok(Vec::new())
    }
}

struct IdleFactory;

impl AdapterFactory for IdleFactory {
    fn build(
        &self,
        connection_id: &str,
        _platform: PlatformType,
        _events: EventSender,
    ) -> Arc<dyn PlatformAdapter> {
        Arc::new(IdleAdapter {
            connection_id: connection_id.to_string(),
            status: Mutex::new(ConnectionStatus::Disconnected),
        })
    }
}

#[derive(Default)]
struct MemConnectionStore {
    records: Mutex<HashMap<String, StoredConnection>>,
}

impl MemConnectionStore {
    fn seed(&self, connection_id: &str, status: ConnectionStatus, age_days: i64) {
        self.records.lock().unwrap().insert(
            connection_id.to_string(),
            StoredConnection {
                id: connection_id.to_string(),
                tenant_id: "tenant-1".into(),
                chatbot_id: "bot-1".into(),
                platform: PlatformType::WhatsappWeb,
                status,
                last_sync_at: Utc::now() - chrono::Duration::days(age_days),
                created_at: Utc::now() - chrono::Duration::days(age_days),
            },
        );
    }

    fn status_of(&self, connection_id: &str) -> Option<ConnectionStatus> {
        self.records
            .lock()
            .unwrap()
            .get(connection_id)
            .map(|r| r.status)
    }
}

#[async_trait]
impl ConnectionStore for MemConnectionStore {
    async fn get(&self, connection_id: &str) -> anyhow::Result<Option<StoredConnection>> {
        Ok(self.records.lock().unwrap().get(connection_id).cloned())
    }

    async fn list_with_status(
        &self,
        statuses: &[ConnectionStatus],
    ) -> anyhow::Result<Vec<StoredConnection>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> anyhow::Result<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(connection_id) {
            record.status = status;
        }
        Ok(())
    }

    async fn touch_sync(&self, connection_id: &str) -> anyhow::Result<()> {
        if let Some(record) = self.records.lock().unwrap().get_mut(connection_id) {
            record.last_sync_at = Utc::now();
        }
        Ok(())
    }
}

fn sweeper_with(store: Arc<MemConnectionStore>) -> (Arc<PlatformManager>, SessionSweeper) {
    let manager = Arc::new(PlatformManager::new(
        Arc::new(IdleFactory),
        Arc::clone(&store) as Arc<dyn ConnectionStore>,
        Arc::new(NoopConversationStore),
        Arc::new(NoopResponseGenerator),
        Arc::new(NoopNotifier),
    ));
    let sweeper = SessionSweeper::new(
        Arc::clone(&manager),
        store as Arc<dyn ConnectionStore>,
        SweepConfig::default(),
    );
    (manager, sweeper)
}

fn whatsapp_config() -> PlatformConnectionConfig {
    PlatformConnectionConfig::new(PlatformCredentials::WhatsappWeb {
        phone_number: None,
        browser_profile: None,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stale_connected_sessions_are_expired() {
    let store = Arc::new(MemConnectionStore::default());
    store.seed("old", ConnectionStatus::Connected, 8);
    store.seed("fresh", ConnectionStatus::Connected, 1);
    let (_manager, sweeper) = sweeper_with(Arc::clone(&store));

    let expired = sweeper.expire_old_sessions().await.unwrap();

    assert_eq!(expired, 1);
    assert_eq!(
        store.status_of("old"),
        Some(ConnectionStatus::Disconnected)
    );
    assert_eq!(
        store.status_of("fresh"),
        Some(ConnectionStatus::Connected),
        "fresh sessions stay untouched"
    );
}

#[tokio::test]
async fn expiry_disconnects_a_live_adapter() {
    let store = Arc::new(MemConnectionStore::default());
    store.seed("old", ConnectionStatus::Connected, 8);
    let (manager, sweeper) = sweeper_with(Arc::clone(&store));

    manager
        .connect_platform("old", whatsapp_config())
        .await
        .unwrap();
    assert!(manager.is_registered("old").await);
    // connect_platform persisted `connected`; age the record back.
    store.seed("old", ConnectionStatus::Connected, 8);

    let expired = sweeper.expire_old_sessions().await.unwrap();

    assert_eq!(expired, 1);
    assert!(!manager.is_registered("old").await);
    assert_eq!(
        store.status_of("old"),
        Some(ConnectionStatus::Disconnected)
    );
}

#[tokio::test]
async fn orphaned_records_are_corrected() {
    let store = Arc::new(MemConnectionStore::default());
    store.seed("orphan", ConnectionStatus::Connected, 1);
    store.seed("starting", ConnectionStatus::Connecting, 0);
    store.seed("down", ConnectionStatus::Disconnected, 1);
    let (_manager, sweeper) = sweeper_with(Arc::clone(&store));

    let cleaned = sweeper.cleanup_orphaned_sessions().await.unwrap();

    assert_eq!(cleaned, 2);
    assert_eq!(
        store.status_of("orphan"),
        Some(ConnectionStatus::Disconnected)
    );
    assert_eq!(
        store.status_of("starting"),
        Some(ConnectionStatus::Disconnected)
    );

    // A second pass finds nothing left to fix.
    assert_eq!(sweeper.cleanup_orphaned_sessions().await.unwrap(), 0);
}

#[tokio::test]
async fn registered_connections_are_not_orphans() {
    let store = Arc::new(MemConnectionStore::default());
    store.seed("live", ConnectionStatus::Connected, 0);
    let (manager, sweeper) = sweeper_with(Arc::clone(&store));

    manager
        .connect_platform("live", whatsapp_config())
        .await
        .unwrap();

    assert_eq!(sweeper.cleanup_orphaned_sessions().await.unwrap(), 0);
    assert_eq!(
        store.status_of("live"),
        Some(ConnectionStatus::Connected)
    );
}

#[tokio::test]
async fn validate_session_checks_record_age_and_liveness() {
    let store = Arc::new(MemConnectionStore::default());
    store.seed("stale", ConnectionStatus::Connected, 8);
    store.seed("no-adapter", ConnectionStatus::Connected, 1);
    store.seed("live", ConnectionStatus::Connected, 0);
    let (manager, sweeper) = sweeper_with(Arc::clone(&store));

    manager
        .connect_platform("live", whatsapp_config())
        .await
        .unwrap();

    assert!(!sweeper.validate_session("missing").await);
    assert!(!sweeper.validate_session("stale").await);
    assert!(!sweeper.validate_session("no-adapter").await);
    assert!(sweeper.validate_session("live").await);
}

//! The Mercado Libre platform adapter.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use {
    async_trait::async_trait,
    chrono::Utc,
    tokio::sync::{Mutex, RwLock},
    tracing::warn,
};

use {
    botline_channels::{
        AdapterCore, AdapterEvent, EventSender, PlatformAdapter,
        core::spawn_poll_loop,
        error::{Error, Result},
    },
    botline_common::types::{
        ChatKind, ConnectionStatus, ContentType, Direction, PlatformChat,
        PlatformConnectionConfig, PlatformMessage, PlatformType, SendOptions,
    },
    botline_resilience::{CircuitBreaker, RetryPolicy},
};

use crate::{
    api::{DEFAULT_BASE_URL, MeliClient, MeliMessage},
    config::MeliCredentials,
};

/// Messages fetched per pack on each poll tick and for buyer resolution.
const POLL_FETCH_LIMIT: usize = 50;

#[derive(Clone)]
struct ConnectedState {
    client: Arc<MeliClient>,
    seller_id: u64,
}

/// Per-pack bookkeeping: resolved buyer and the ids already emitted.
#[derive(Default)]
struct ChatState {
    buyer_id: Option<u64>,
    buyer_name: Option<String>,
    seen: HashSet<String>,
}

type ChatMap = Arc<Mutex<HashMap<String, ChatState>>>;

pub struct MercadoLibreAdapter {
    core: Arc<AdapterCore>,
    base_url: String,
    default_poll_interval: Duration,
    state: Arc<RwLock<Option<ConnectedState>>>,
    chats: ChatMap,
}

impl MercadoLibreAdapter {
    pub fn new(
        connection_id: impl Into<String>,
        events: EventSender,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        default_poll_interval: Duration,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(
                connection_id,
                PlatformType::MercadoLibre,
                events,
                breaker,
                retry,
            )),
            base_url: DEFAULT_BASE_URL.into(),
            default_poll_interval,
            state: Arc::new(RwLock::new(None)),
            chats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Point the adapter at a different API host (sandbox, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn connected_state(&self) -> Result<ConnectedState> {
        self.state
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::not_connected(PlatformType::MercadoLibre))
    }

    /// Buyer user id for a pack, from cache or by reading the thread.
    async fn buyer_for(&self, chat_id: &str, state: &ConnectedState) -> Result<u64> {
        if let Some(id) = self
            .chats
            .lock()
            .await
            .get(chat_id)
            .and_then(|c| c.buyer_id)
        {
            return Ok(id);
        }

        let messages = state
            .client
            .pack_messages(chat_id, state.seller_id, POLL_FETCH_LIMIT)
            .await
            .map_err(|e| Error::external("resolve pack buyer", e))?;
        let buyer = messages
            .iter()
            .map(|m| m.from.user_id)
            .find(|id| *id != state.seller_id);

        match buyer {
            Some(id) => {
                self.chats
                    .lock()
                    .await
                    .entry(chat_id.to_string())
                    .or_default()
                    .buyer_id = Some(id);
                Ok(id)
            },
            None => Err(Error::invalid_input(format!(
                "no buyer message found in pack {chat_id}"
            ))),
        }
    }

    /// One reconnect attempt from the last-known config when a send arrives
    /// while disconnected or errored.
    async fn recover_if_needed(&self) -> Result<()> {
        if !matches!(
            self.core.status(),
            ConnectionStatus::Disconnected | ConnectionStatus::Error
        ) {
            return Ok(());
        }
        let Some(config) = self.core.last_config() else {
            return Ok(());
        };
        warn!(
            connection_id = self.core.connection_id(),
            "adapter not connected, attempting reconnect before send"
        );
        self.connect(&config).await
    }
}

#[async_trait]
impl PlatformAdapter for MercadoLibreAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::MercadoLibre
    }

    fn connection_id(&self) -> &str {
        self.core.connection_id()
    }

    fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    async fn connect(&self, config: &PlatformConnectionConfig) -> Result<()> {
        let creds = match MeliCredentials::from_platform(&config.credentials) {
            Ok(creds) => creds,
            Err(err) => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(err);
            },
        };

        self.core.set_status(ConnectionStatus::Connecting);

        let client = match MeliClient::new(creds.access_token.clone(), &self.base_url) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(Error::external("build mercadolibre client", err));
            },
        };

        let probe = {
            let client = Arc::clone(&client);
            self.core
                .guarded("verify mercadolibre credentials", move || {
                    let client = Arc::clone(&client);
                    async move { client.me().await.map_err(anyhow::Error::from) }
                })
                .await
        };
        let me = match probe {
            Ok(me) => me,
            Err(err) => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(classify_auth(err));
            },
        };

        let seller_id = match creds.seller_id {
            Some(id) if id != me.id => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(Error::auth_failed(format!(
                    "access token belongs to user {} but seller_id is {id}",
                    me.id
                )));
            },
            Some(id) => id,
            None => me.id,
        };

        *self.state.write().await = Some(ConnectedState {
            client: Arc::clone(&client),
            seller_id,
        });
        self.core.remember_config(config);
        self.core.set_status(ConnectionStatus::Connected);

        let period = config
            .options
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_poll_interval);
        let cancel = self.core.begin_polling();
        let core = Arc::clone(&self.core);
        let chats = Arc::clone(&self.chats);
        spawn_poll_loop(
            self.core.connection_id().to_string(),
            PlatformType::MercadoLibre,
            period,
            cancel,
            move || {
                let core = Arc::clone(&core);
                let client = Arc::clone(&client);
                let chats = Arc::clone(&chats);
                async move {
                    let result = poll_once(&core, &client, seller_id, &chats).await;
                    if let Err(err) = &result {
                        core.emit_error(format!("mercadolibre poll failed: {err}"));
                    }
                    result
                }
            },
        );

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.stop_polling();
        *self.state.write().await = None;
        // `chats` survives a reconnect: the seen-id sets keep old messages
        // from being re-emitted.
        self.core.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        options: Option<SendOptions>,
    ) -> Result<PlatformMessage> {
        self.recover_if_needed().await?;
        self.core.ensure_connected()?;
        let state = self.connected_state().await?;

        let options = options.unwrap_or_default();
        let mut content_type = ContentType::Text;
        let attachments: Vec<String> = match &options.media {
            Some(media) => {
                if media.path.is_some() {
                    return Err(Error::unavailable(
                        "mercadolibre media must be pre-uploaded; pass the attachment id as url",
                    ));
                }
                content_type = media.kind;
                media.url.clone().into_iter().collect()
            },
            None => Vec::new(),
        };

        let to_user_id = self.buyer_for(chat_id, &state).await?;

        let sent_id = {
            let client = Arc::clone(&state.client);
            let pack_id = chat_id.to_string();
            let text = content.to_string();
            let attachments = attachments.clone();
            let seller_id = state.seller_id;
            self.core
                .guarded("send mercadolibre message", move || {
                    let client = Arc::clone(&client);
                    let pack_id = pack_id.clone();
                    let text = text.clone();
                    let attachments = attachments.clone();
                    async move {
                        client
                            .send_message(&pack_id, seller_id, to_user_id, &text, &attachments)
                            .await
                            .map_err(anyhow::Error::from)
                    }
                })
                .await
                .map_err(classify_auth)?
        };

        let message = PlatformMessage {
            id: sent_id.unwrap_or_else(PlatformMessage::fallback_id),
            chat_id: chat_id.to_string(),
            direction: Direction::Outgoing,
            content: content.to_string(),
            content_type,
            timestamp: Utc::now(),
            sender_id: Some(state.seller_id.to_string()),
            sender_name: None,
            media_url: options.media.and_then(|m| m.url),
            metadata: None,
        };

        self.chats
            .lock()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .seen
            .insert(message.id.clone());

        Ok(message)
    }

    async fn get_chats(&self) -> Result<Vec<PlatformChat>> {
        self.core.ensure_connected()?;
        let state = self.connected_state().await?;

        let unread = state
            .client
            .unread_threads()
            .await
            .map_err(|e| Error::external("list unread packs", e))?;

        let mut chats = self.chats.lock().await;
        for thread in &unread {
            chats.entry(thread.pack_id.clone()).or_default();
        }

        Ok(chats
            .iter()
            .map(|(pack_id, chat)| PlatformChat {
                id: pack_id.clone(),
                name: chat
                    .buyer_name
                    .clone()
                    .unwrap_or_else(|| format!("Pack {pack_id}")),
                kind: ChatKind::Individual,
                metadata: None,
            })
            .collect())
    }

    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<PlatformMessage>> {
        self.core.ensure_connected()?;
        let state = self.connected_state().await?;

        let messages = state
            .client
            .pack_messages(chat_id, state.seller_id, limit)
            .await
            .map_err(|e| Error::external("fetch pack messages", e))?;

        Ok(messages
            .iter()
            .map(|m| map_message(chat_id, m, state.seller_id))
            .collect())
    }
}

/// One poll pass: unread packs, then the delta messages of each.
async fn poll_once(
    core: &AdapterCore,
    client: &MeliClient,
    seller_id: u64,
    chats: &ChatMap,
) -> anyhow::Result<()> {
    let threads = client.unread_threads().await?;

    for thread in threads {
        let messages = client
            .pack_messages(&thread.pack_id, seller_id, POLL_FETCH_LIMIT)
            .await?;

        let fresh = {
            let mut chats = chats.lock().await;
            let chat = chats.entry(thread.pack_id.clone()).or_default();
            let mut fresh = Vec::new();
            for message in &messages {
                // Without a platform id there is nothing to deduplicate on;
                // skip instead of re-emitting on every tick.
                let Some(key) = message.id.clone() else {
                    continue;
                };
                if !chat.seen.insert(key) {
                    continue;
                }
                if message.from.user_id == seller_id {
                    // The account's own replies come back in the thread;
                    // only buyer traffic is emitted.
                    continue;
                }
                chat.buyer_id = Some(message.from.user_id);
                fresh.push(map_message(&thread.pack_id, message, seller_id));
            }
            fresh
        };

        for message in fresh {
            core.emit(AdapterEvent::Message { message });
        }
    }

    Ok(())
}

fn map_message(pack_id: &str, message: &MeliMessage, seller_id: u64) -> PlatformMessage {
    let direction = if message.from.user_id == seller_id {
        Direction::Outgoing
    } else {
        Direction::Incoming
    };
    let content = message.text.clone().unwrap_or_default();
    let attachments = message.message_attachments.as_deref().unwrap_or(&[]);
    let content_type = if content.is_empty() && !attachments.is_empty() {
        ContentType::Document
    } else {
        ContentType::Text
    };
    let metadata = if attachments.is_empty() {
        None
    } else {
        let names: Vec<_> = attachments
            .iter()
            .map(|a| {
                a.original_filename
                    .clone()
                    .or_else(|| a.filename.clone())
                    .unwrap_or_default()
            })
            .collect();
        Some(serde_json::json!({ "attachments": names }))
    };

    PlatformMessage {
        id: message
            .id
            .clone()
            .unwrap_or_else(PlatformMessage::fallback_id),
        chat_id: pack_id.to_string(),
        direction,
        content,
        content_type,
        timestamp: message
            .message_date
            .as_ref()
            .and_then(|d| d.created)
            .unwrap_or_else(Utc::now),
        sender_id: Some(message.from.user_id.to_string()),
        sender_name: None,
        media_url: None,
        metadata,
    }
}

/// Rewrite wrapped 401/403 responses as authentication failures so callers
/// see them unretried and typed.
fn classify_auth(err: Error) -> Error {
    if let Error::External { source, .. } = &err {
        let text = source.to_string();
        if text.contains("returned 401") || text.contains("returned 403") {
            return Error::auth_failed(text);
        }
    }
    err
}

#[cfg(test)]
mod tests {
    use {
        botline_channels::{EventReceiver, event_channel},
        botline_common::types::{ConnectionOptions, PlatformCredentials},
        botline_resilience::BreakerRegistry,
        secrecy::Secret,
    };

    use super::*;

    fn test_adapter(base_url: &str) -> (MercadoLibreAdapter, EventReceiver) {
        let (tx, rx) = event_channel();
        let registry = BreakerRegistry::default();
        let adapter = MercadoLibreAdapter::new(
            "c1",
            tx,
            registry.for_platform("mercadolibre"),
            RetryPolicy {
                max_retries: 0,
                ..Default::default()
            },
            Duration::from_secs(10),
        )
        .with_base_url(base_url);
        (adapter, rx)
    }

    fn test_config(seller_id: Option<&str>) -> PlatformConnectionConfig {
        PlatformConnectionConfig {
            platform: PlatformType::MercadoLibre,
            credentials: PlatformCredentials::MercadoLibre {
                app_id: "app".into(),
                client_secret: Secret::new("secret".into()),
                access_token: Secret::new("token".into()),
                seller_id: seller_id.map(String::from),
            },
            // A huge poll interval keeps the loop quiet during tests.
            options: ConnectionOptions {
                poll_interval_secs: Some(3600),
                ..Default::default()
            },
        }
    }

    async fn mock_me(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("GET", "/users/me")
            .with_status(200)
            .with_body(r#"{"id": 42, "nickname": "ACME"}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn connect_probes_and_reaches_connected() {
        let mut server = mockito::Server::new_async().await;
        let _me = mock_me(&mut server).await;

        let (adapter, mut rx) = test_adapter(&server.url());
        adapter.connect(&test_config(None)).await.unwrap();

        assert_eq!(adapter.status(), ConnectionStatus::Connected);
        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first,
            AdapterEvent::Status {
                to: ConnectionStatus::Connecting,
                ..
            }
        ));
        let second = rx.try_recv().unwrap();
        assert!(matches!(
            second,
            AdapterEvent::Status {
                to: ConnectionStatus::Connected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn connect_with_rejected_token_fails_as_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _me = server
            .mock("GET", "/users/me")
            .with_status(401)
            .with_body(r#"{"message": "invalid token"}"#)
            .create_async()
            .await;

        let (adapter, _rx) = test_adapter(&server.url());
        let err = adapter.connect(&test_config(None)).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
        assert_eq!(adapter.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn connect_with_mismatched_seller_id_fails() {
        let mut server = mockito::Server::new_async().await;
        let _me = mock_me(&mut server).await;

        let (adapter, _rx) = test_adapter(&server.url());
        let err = adapter.connect(&test_config(Some("7"))).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
        assert_eq!(adapter.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn connect_without_credentials_fails_fast() {
        let (adapter, _rx) = test_adapter("http://unused.invalid");
        let mut config = test_config(None);
        config.credentials = PlatformCredentials::MercadoLibre {
            app_id: "app".into(),
            client_secret: Secret::new("secret".into()),
            access_token: Secret::new(String::new()),
            seller_id: None,
        };

        let err = adapter.connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
        assert_eq!(adapter.status(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn send_message_resolves_the_buyer_and_posts() {
        let mut server = mockito::Server::new_async().await;
        let _me = mock_me(&mut server).await;
        let _messages = server
            .mock(
                "GET",
                "/messages/packs/111/sellers/42?tag=post_sale&mark_as_read=false&limit=50",
            )
            .with_status(200)
            .with_body(r#"{"messages": [{"id": "m1", "from": {"user_id": 7}, "text": "hola"}]}"#)
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/messages/packs/111/sellers/42?tag=post_sale")
            .with_status(201)
            .with_body(r#"{"id": "m9"}"#)
            .create_async()
            .await;

        let (adapter, _rx) = test_adapter(&server.url());
        adapter.connect(&test_config(None)).await.unwrap();

        let sent = adapter.send_message("111", "gracias!", None).await.unwrap();
        assert_eq!(sent.id, "m9");
        assert_eq!(sent.direction, Direction::Outgoing);
        assert_eq!(sent.chat_id, "111");
    }

    #[tokio::test]
    async fn send_without_connection_or_config_fails() {
        let (adapter, _rx) = test_adapter("http://unused.invalid");
        let err = adapter.send_message("111", "hi", None).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected { .. }));
    }

    #[tokio::test]
    async fn send_after_disconnect_auto_recovers() {
        let mut server = mockito::Server::new_async().await;
        let _me = mock_me(&mut server).await;
        let _messages = server
            .mock(
                "GET",
                "/messages/packs/111/sellers/42?tag=post_sale&mark_as_read=false&limit=50",
            )
            .with_status(200)
            .with_body(r#"{"messages": [{"id": "m1", "from": {"user_id": 7}, "text": "hola"}]}"#)
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/messages/packs/111/sellers/42?tag=post_sale")
            .with_status(201)
            .with_body(r#"{"id": "m10"}"#)
            .create_async()
            .await;

        let (adapter, _rx) = test_adapter(&server.url());
        adapter.connect(&test_config(None)).await.unwrap();
        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.status(), ConnectionStatus::Disconnected);

        let sent = adapter.send_message("111", "de nada", None).await.unwrap();
        assert_eq!(sent.id, "m10");
        assert_eq!(adapter.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn polling_emits_incoming_messages_once() {
        let mut server = mockito::Server::new_async().await;
        let _unread = server
            .mock("GET", "/messages/unread?role=seller&tag=post_sale")
            .with_status(200)
            .with_body(r#"{"results": [{"resource": "/packs/111/sellers/42", "count": 1}]}"#)
            .create_async()
            .await;
        let _messages = server
            .mock(
                "GET",
                "/messages/packs/111/sellers/42?tag=post_sale&mark_as_read=false&limit=50",
            )
            .with_status(200)
            .with_body(
                r#"{"messages": [
                    {"id": "m1", "from": {"user_id": 7}, "text": "hola"},
                    {"id": "m2", "from": {"user_id": 42}, "text": "own reply"}
                ]}"#,
            )
            .create_async()
            .await;

        let (tx, mut rx) = event_channel();
        let registry = BreakerRegistry::default();
        let core = AdapterCore::new(
            "c1",
            PlatformType::MercadoLibre,
            tx,
            registry.for_platform("mercadolibre"),
            RetryPolicy::default(),
        );
        let client = MeliClient::new(Secret::new("token".into()), server.url()).unwrap();
        let chats: ChatMap = Arc::new(Mutex::new(HashMap::new()));

        poll_once(&core, &client, 42, &chats).await.unwrap();
        poll_once(&core, &client, 42, &chats).await.unwrap();

        let event = rx.try_recv().unwrap();
        match event {
            AdapterEvent::Message { message } => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.direction, Direction::Incoming);
                assert_eq!(message.sender_id.as_deref(), Some("7"));
            },
            other => panic!("expected message event, got {other:?}"),
        }
        // The seller's own reply is filtered and the second poll is a no-op.
        assert!(rx.try_recv().is_err());
    }
}

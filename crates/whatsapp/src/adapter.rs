//! The WhatsApp Web platform adapter.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use {
    async_trait::async_trait,
    chromiumoxide::Page,
    chrono::Utc,
    tokio::sync::Mutex,
    tracing::{info, warn},
};

use {
    botline_browser::{AcquireOptions, BrowserPool},
    botline_channels::{
        AdapterCore, AdapterEvent, EventSender, PlatformAdapter,
        core::spawn_poll_loop,
        error::{Error, Result},
    },
    botline_common::types::{
        AuthMethod, AuthPrompt, ChatKind, ConnectionStatus, ContentType, Direction, PlatformChat,
        PlatformConnectionConfig, PlatformMessage, PlatformType, SendOptions,
    },
    botline_resilience::{CircuitBreaker, RetryPolicy},
};

use crate::{
    config::WhatsAppCredentials,
    dom::{
        self, COMPOSER_SELECTOR, DomChat, DomMessage, LOGIN_PROBE_SCRIPT, LoginProbe,
        UNREAD_CHATS_SCRIPT, eval_json,
    },
};

const WHATSAPP_URL: &str = "https://web.whatsapp.com";

/// Cadence of the login-state probe while waiting for a QR scan.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Pause after UI interactions so the client can re-render.
const RENDER_DELAY: Duration = Duration::from_millis(400);

/// Message bubbles read per chat on each poll tick.
const POLL_FETCH_LIMIT: usize = 30;

type SeenMap = Arc<Mutex<HashMap<String, HashSet<String>>>>;

pub struct WhatsAppAdapter {
    core: Arc<AdapterCore>,
    pool: Arc<BrowserPool>,
    default_poll_interval: Duration,
    default_login_timeout: Duration,
    seen: SeenMap,
}

impl WhatsAppAdapter {
    pub fn new(
        connection_id: impl Into<String>,
        events: EventSender,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        pool: Arc<BrowserPool>,
        default_poll_interval: Duration,
        default_login_timeout: Duration,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(
                connection_id,
                PlatformType::WhatsappWeb,
                events,
                breaker,
                retry,
            )),
            pool,
            default_poll_interval,
            default_login_timeout,
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for the chat list, surfacing the QR prompt once when the client
    /// asks for a scan. Bounded by the configured login timeout.
    async fn wait_for_login(&self, page: &Page, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut prompted = false;

        loop {
            let probe: LoginProbe = eval_json(page, LOGIN_PROBE_SCRIPT)
                .await
                .map_err(|e| Error::external("probe whatsapp login state", e))?;

            match probe.state.as_str() {
                "ready" => return Ok(()),
                "qr" => {
                    if !prompted {
                        info!(
                            connection_id = self.core.connection_id(),
                            "whatsapp web is asking for a QR scan"
                        );
                        self.core.emit_auth_prompt(AuthPrompt {
                            method: AuthMethod::Qr,
                            url: Some(WHATSAPP_URL.to_string()),
                            data: probe.data,
                        });
                        prompted = true;
                    }
                },
                _ => {},
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::auth_failed(
                    "whatsapp web login was not completed before the timeout",
                ));
            }
            tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
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

    async fn open_chat(&self, page: &Page, chat_id: &str) -> Result<()> {
        let opened: bool = eval_json(page, &dom::open_chat_script(chat_id))
            .await
            .map_err(|e| Error::external("open whatsapp chat", e))?;
        if !opened {
            return Err(Error::invalid_input(format!(
                "chat not found in list: {chat_id}"
            )));
        }
        tokio::time::sleep(RENDER_DELAY).await;
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for WhatsAppAdapter {
    fn platform(&self) -> PlatformType {
        PlatformType::WhatsappWeb
    }

    fn connection_id(&self) -> &str {
        self.core.connection_id()
    }

    fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    async fn connect(&self, config: &PlatformConnectionConfig) -> Result<()> {
        let creds = match WhatsAppCredentials::from_platform(&config.credentials) {
            Ok(creds) => creds,
            Err(err) => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(err);
            },
        };

        self.core.set_status(ConnectionStatus::Connecting);

        let acquire = AcquireOptions {
            proxy: config.options.proxy.clone(),
            profile_dir: creds.browser_profile.clone(),
        };
        let page = match self.pool.acquire(self.core.connection_id(), acquire).await {
            Ok(page) => page,
            Err(err) => {
                self.core.set_status(ConnectionStatus::Error);
                return Err(Error::external("acquire browser", err));
            },
        };

        if let Err(err) = page.goto(WHATSAPP_URL).await {
            self.core.set_status(ConnectionStatus::Error);
            return Err(Error::external("open whatsapp web", err));
        }

        let login_timeout = config
            .options
            .login_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_login_timeout);
        if let Err(err) = self.wait_for_login(&page, login_timeout).await {
            self.core.set_status(ConnectionStatus::Error);
            return Err(err);
        }

        self.core.remember_config(config);
        self.core.set_status(ConnectionStatus::Connected);
        info!(
            connection_id = self.core.connection_id(),
            phone = creds.phone_number.as_deref().unwrap_or("unknown"),
            "whatsapp web connected"
        );

        let period = config
            .options
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_poll_interval);
        let cancel = self.core.begin_polling();
        let core = Arc::clone(&self.core);
        let pool = Arc::clone(&self.pool);
        let seen = Arc::clone(&self.seen);
        spawn_poll_loop(
            self.core.connection_id().to_string(),
            PlatformType::WhatsappWeb,
            period,
            cancel,
            move || {
                let core = Arc::clone(&core);
                let pool = Arc::clone(&pool);
                let seen = Arc::clone(&seen);
                async move {
                    let result = poll_once(&core, &pool, &seen).await;
                    if let Err(err) = &result {
                        core.emit_error(format!("whatsapp poll failed: {err}"));
                    }
                    result
                }
            },
        );

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.stop_polling();
        if let Err(err) = self.pool.release(self.core.connection_id()).await {
            warn!(
                connection_id = self.core.connection_id(),
                error = %err,
                "failed to release browser on disconnect"
            );
        }
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

        if options.as_ref().is_some_and(|o| o.media.is_some()) {
            return Err(Error::unavailable(
                "whatsapp web sends are text only; media is not supported",
            ));
        }

        let sent_id = {
            let pool = Arc::clone(&self.pool);
            let connection_id = self.core.connection_id().to_string();
            let chat_id = chat_id.to_string();
            let content = content.to_string();
            self.core
                .guarded("send whatsapp message", move || {
                    let pool = Arc::clone(&pool);
                    let connection_id = connection_id.clone();
                    let chat_id = chat_id.clone();
                    let content = content.clone();
                    async move {
                        let page = pool.page(&connection_id).await?;
                        let opened: bool =
                            eval_json(&page, &dom::open_chat_script(&chat_id)).await?;
                        if !opened {
                            anyhow::bail!("chat not found in list: {chat_id}");
                        }
                        tokio::time::sleep(RENDER_DELAY).await;

                        let composer = page
                            .find_element(COMPOSER_SELECTOR)
                            .await
                            .map_err(|e| anyhow::anyhow!("composer not found: {e}"))?;
                        composer.click().await?;
                        composer.type_str(&content).await?;
                        composer.press_key("Enter").await?;
                        tokio::time::sleep(RENDER_DELAY).await;

                        // Pick up the platform id of the bubble we just sent.
                        let messages: Vec<DomMessage> =
                            eval_json(&page, &dom::read_messages_script(5)).await?;
                        Ok(messages
                            .iter()
                            .rev()
                            .find(|m| !m.incoming && !m.id.is_empty())
                            .map(|m| m.id.clone()))
                    }
                })
                .await?
        };

        let message = PlatformMessage {
            id: sent_id.unwrap_or_else(PlatformMessage::fallback_id),
            chat_id: chat_id.to_string(),
            direction: Direction::Outgoing,
            content: content.to_string(),
            content_type: ContentType::Text,
            timestamp: Utc::now(),
            sender_id: None,
            sender_name: None,
            media_url: None,
            metadata: None,
        };

        self.seen
            .lock()
            .await
            .entry(chat_id.to_string())
            .or_default()
            .insert(message.id.clone());

        Ok(message)
    }

    async fn get_chats(&self) -> Result<Vec<PlatformChat>> {
        self.core.ensure_connected()?;
        let page = self
            .pool
            .page(self.core.connection_id())
            .await
            .map_err(|e| Error::unavailable(e))?;

        let chats: Vec<DomChat> = eval_json(&page, dom::LIST_CHATS_SCRIPT)
            .await
            .map_err(|e| Error::external("list whatsapp chats", e))?;

        Ok(chats
            .into_iter()
            .map(|chat| PlatformChat {
                id: chat.id,
                name: chat.name,
                kind: ChatKind::Individual,
                metadata: None,
            })
            .collect())
    }

    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<PlatformMessage>> {
        self.core.ensure_connected()?;
        let page = self
            .pool
            .page(self.core.connection_id())
            .await
            .map_err(|e| Error::unavailable(e))?;

        self.open_chat(&page, chat_id).await?;
        let messages: Vec<DomMessage> = eval_json(&page, &dom::read_messages_script(limit))
            .await
            .map_err(|e| Error::external("read whatsapp messages", e))?;

        Ok(messages
            .iter()
            .map(|m| map_dom_message(chat_id, m))
            .collect())
    }
}

/// One poll pass: chats with unread badges, then the delta bubbles of each.
async fn poll_once(core: &AdapterCore, pool: &BrowserPool, seen: &SeenMap) -> anyhow::Result<()> {
    let page = pool.page(core.connection_id()).await?;
    let unread: Vec<DomChat> = eval_json(&page, UNREAD_CHATS_SCRIPT).await?;

    for chat in unread {
        let opened: bool = eval_json(&page, &dom::open_chat_script(&chat.id)).await?;
        if !opened {
            warn!(chat_id = chat.id, "unread chat row disappeared before opening");
            continue;
        }
        tokio::time::sleep(RENDER_DELAY).await;

        let messages: Vec<DomMessage> =
            eval_json(&page, &dom::read_messages_script(POLL_FETCH_LIMIT)).await?;

        let fresh = {
            let mut seen = seen.lock().await;
            let chat_seen = seen.entry(chat.id.clone()).or_default();
            let mut fresh = Vec::new();
            for message in &messages {
                // A bubble without a data-id cannot be deduplicated across
                // ticks; skip it rather than re-emit it forever.
                if message.id.is_empty() {
                    continue;
                }
                if !chat_seen.insert(message.id.clone()) {
                    continue;
                }
                // Outgoing bubbles are the account's own replies.
                if message.incoming {
                    fresh.push(map_dom_message(&chat.id, message));
                }
            }
            fresh
        };

        for message in fresh {
            core.emit(AdapterEvent::Message { message });
        }
    }

    Ok(())
}

fn map_dom_message(chat_id: &str, message: &DomMessage) -> PlatformMessage {
    PlatformMessage {
        id: if message.id.is_empty() {
            PlatformMessage::fallback_id()
        } else {
            message.id.clone()
        },
        chat_id: chat_id.to_string(),
        direction: if message.incoming {
            Direction::Incoming
        } else {
            Direction::Outgoing
        },
        content: message.text.clone(),
        content_type: ContentType::Text,
        // The DOM only shows locale-formatted clock times; arrival time
        // stands in for the platform timestamp.
        timestamp: Utc::now(),
        sender_id: None,
        sender_name: dom::parse_sender(&message.meta),
        media_url: None,
        metadata: None,
    }
}

//! Adapter registry and connection lifecycle orchestration.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use {
    botline_channels::{
        AdapterEvent, AdapterRegistry, ConnectionStore, EventReceiver, PlatformAdapter,
        error::{Error, Result},
        event_channel,
    },
    botline_common::types::{
        ConnectionStatus, PlatformChat, PlatformConnectionConfig, PlatformMessage, PlatformType,
        SendOptions,
    },
};

use crate::{
    factory::AdapterFactory,
    pipeline,
    services::{ConversationStore, Notifier, ResponseGenerator},
};

/// Tenant/chatbot context of a connection, resolved from the persisted
/// record at connect time.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub tenant_id: String,
    pub chatbot_id: String,
}

/// Point-in-time connection health, for dashboards and probes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionHealth {
    pub connection_id: String,
    pub platform: PlatformType,
    pub status: ConnectionStatus,
    pub connected: bool,
}

pub(crate) struct ManagerInner {
    pub registry: AdapterRegistry,
    pub connections: Arc<dyn ConnectionStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub notifier: Arc<dyn Notifier>,
    factory: Arc<dyn AdapterFactory>,
}

/// Owns every live adapter and routes their events through the dispatch
/// pipeline. One instance per process; collaborators are injected.
pub struct PlatformManager {
    inner: Arc<ManagerInner>,
}

impl PlatformManager {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        connections: Arc<dyn ConnectionStore>,
        conversations: Arc<dyn ConversationStore>,
        responder: Arc<dyn ResponseGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: AdapterRegistry::new(),
                connections,
                conversations,
                responder,
                notifier,
                factory,
            }),
        }
    }

    /// Create, wire, and connect the adapter for a connection.
    ///
    /// A second call for an already-registered id is a warning no-op. On
    /// connect failure the persisted status is set to `error` and the error
    /// re-raised.
    pub async fn connect_platform(
        &self,
        connection_id: &str,
        config: PlatformConnectionConfig,
    ) -> Result<()> {
        if self.inner.registry.contains(connection_id).await {
            warn!(connection_id, "connection already registered, ignoring connect");
            return Ok(());
        }

        config.validate().map_err(Error::invalid_input)?;
        let ctx = self.connection_context(connection_id).await?;

        let (events, rx) = event_channel();
        let adapter = self
            .inner
            .factory
            .build(connection_id, config.platform, events);
        self.spawn_event_loop(connection_id, ctx.clone(), config.platform, rx);

        info!(connection_id, platform = %config.platform, "connecting platform");
        match adapter.connect(&config).await {
            Ok(()) => {
                self.inner
                    .registry
                    .insert(connection_id, Arc::clone(&adapter))
                    .await;
                self.persist_status(connection_id, ConnectionStatus::Connected)
                    .await;
                Ok(())
            },
            Err(err) => {
                error!(
                    connection_id,
                    platform = %config.platform,
                    error = %err,
                    "platform connect failed"
                );
                self.persist_status(connection_id, ConnectionStatus::Error)
                    .await;
                Err(err)
            },
        }
    }

    /// Disconnect the adapter, drop it from the registry, persist
    /// `disconnected`.
    pub async fn disconnect_platform(&self, connection_id: &str) -> Result<()> {
        let adapter = self
            .inner
            .registry
            .remove(connection_id)
            .await
            .ok_or_else(|| Error::adapter_not_found(connection_id))?;

        if let Err(err) = adapter.disconnect().await {
            warn!(connection_id, error = %err, "adapter disconnect reported an error");
        }
        self.persist_status(connection_id, ConnectionStatus::Disconnected)
            .await;
        info!(connection_id, "platform disconnected");
        Ok(())
    }

    /// Direct send through a connected adapter. Not retried at this level —
    /// retry/backoff live inside the adapter.
    pub async fn send_message(
        &self,
        connection_id: &str,
        chat_id: &str,
        content: &str,
        options: Option<SendOptions>,
    ) -> Result<PlatformMessage> {
        let adapter = self.require_connected(connection_id).await?;
        adapter.send_message(chat_id, content, options).await
    }

    pub async fn get_chats(&self, connection_id: &str) -> Result<Vec<PlatformChat>> {
        let adapter = self.require_connected(connection_id).await?;
        adapter.get_chats().await
    }

    pub async fn get_messages(
        &self,
        connection_id: &str,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<PlatformMessage>> {
        let adapter = self.require_connected(connection_id).await?;
        adapter.get_messages(chat_id, limit).await
    }

    /// Whether an adapter is registered for the connection id.
    pub async fn is_registered(&self, connection_id: &str) -> bool {
        self.inner.registry.contains(connection_id).await
    }

    /// Whether a registered adapter currently reports `connected`.
    pub async fn is_connected(&self, connection_id: &str) -> bool {
        match self.inner.registry.get(connection_id).await {
            Some(adapter) => adapter.status() == ConnectionStatus::Connected,
            None => false,
        }
    }

    /// Health snapshot across every registered adapter.
    pub async fn health_snapshot(&self) -> Vec<ConnectionHealth> {
        let mut health = Vec::new();
        for connection_id in self.inner.registry.connection_ids().await {
            if let Some(adapter) = self.inner.registry.get(&connection_id).await {
                let status = adapter.status();
                health.push(ConnectionHealth {
                    connection_id,
                    platform: adapter.platform(),
                    status,
                    connected: status == ConnectionStatus::Connected,
                });
            }
        }
        health
    }

    async fn require_connected(&self, connection_id: &str) -> Result<Arc<dyn PlatformAdapter>> {
        let adapter = self
            .inner
            .registry
            .get(connection_id)
            .await
            .ok_or_else(|| Error::adapter_not_found(connection_id))?;
        if adapter.status() != ConnectionStatus::Connected {
            return Err(Error::not_connected(adapter.platform()));
        }
        Ok(adapter)
    }

    async fn connection_context(&self, connection_id: &str) -> Result<ConnectionContext> {
        let record = self
            .inner
            .connections
            .get(connection_id)
            .await
            .map_err(|e| Error::external("load connection record", e))?
            .ok_or_else(|| {
                Error::invalid_input(format!("no connection record for {connection_id}"))
            })?;
        Ok(ConnectionContext {
            tenant_id: record.tenant_id,
            chatbot_id: record.chatbot_id,
        })
    }

    async fn persist_status(&self, connection_id: &str, status: ConnectionStatus) {
        if let Err(err) = self
            .inner
            .connections
            .update_status(connection_id, status)
            .await
        {
            warn!(connection_id, status = %status, error = %err, "failed to persist connection status");
        }
    }

    /// Consume an adapter's event channel until the adapter is dropped.
    ///
    /// Per-message pipeline failures are logged and swallowed here: a bad
    /// message must not take down the adapter or the loop.
    fn spawn_event_loop(
        &self,
        connection_id: &str,
        ctx: ConnectionContext,
        platform: PlatformType,
        mut rx: EventReceiver,
    ) {
        let inner = Arc::clone(&self.inner);
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    AdapterEvent::Message { message } => {
                        if let Err(err) = pipeline::handle_inbound(
                            &inner,
                            &ctx,
                            &connection_id,
                            platform,
                            message,
                        )
                        .await
                        {
                            error!(
                                connection_id,
                                platform = %platform,
                                error = %err,
                                "message pipeline failed"
                            );
                        }
                    },
                    AdapterEvent::Status { to, .. } => {
                        if let Err(err) = inner.connections.update_status(&connection_id, to).await
                        {
                            warn!(
                                connection_id,
                                status = %to,
                                error = %err,
                                "failed to persist status change"
                            );
                        }
                        inner
                            .notifier
                            .notify_status(&ctx.tenant_id, &connection_id, to)
                            .await;
                    },
                    AdapterEvent::Authenticating { prompt } => {
                        inner
                            .notifier
                            .notify_auth_prompt(&ctx.tenant_id, &connection_id, &prompt)
                            .await;
                    },
                    AdapterEvent::Error { message } => {
                        error!(connection_id, platform = %platform, message, "adapter error");
                    },
                }
            }
            debug!(connection_id, "adapter event loop ended");
        });
    }
}

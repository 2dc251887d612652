use {async_trait::async_trait, tokio::sync::mpsc};

use botline_common::types::{
    AuthPrompt, ConnectionStatus, PlatformChat, PlatformConnectionConfig, PlatformMessage,
    PlatformType, SendOptions,
};

use crate::error::Result;

// ── Adapter events ──────────────────────────────────────────────────────────

/// Events emitted by an adapter over its per-instance channel.
///
/// Sends are fire-and-forget: an emitter never blocks and never fails the
/// operation that produced the event, even with the consumer gone.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// An inbound platform message (adapters only emit incoming traffic).
    Message { message: PlatformMessage },
    /// Status changed. Emitted exactly once per transition.
    Status {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    /// The platform requires an out-of-band step to finish logging in.
    Authenticating { prompt: AuthPrompt },
    /// A non-fatal adapter error worth surfacing (connection-level failures
    /// transition status instead).
    Error { message: String },
}

pub type EventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// Create the event channel wired between an adapter and its consumer.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ── Adapter contract ────────────────────────────────────────────────────────

/// Uniform capability contract implemented once per platform.
///
/// Status machine shared by all implementations:
/// `disconnected → connecting → [authenticating] → connected`, any state
/// `→ error` on failure, and `disconnect()` lands in `disconnected` from
/// anywhere. `error` is recoverable via a fresh `connect()`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> PlatformType;

    fn connection_id(&self) -> &str;

    fn status(&self) -> ConnectionStatus;

    /// Establish the underlying channel: credential validation, client or
    /// browser setup, connectivity probe, then the polling loop.
    async fn connect(&self, config: &PlatformConnectionConfig) -> Result<()>;

    /// Release the underlying resource and stop polling.
    async fn disconnect(&self) -> Result<()>;

    /// Send a message, retried with backoff inside the platform's circuit
    /// breaker. When the adapter is disconnected or errored, one reconnect
    /// attempt from the last-known config is made before failing.
    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        options: Option<SendOptions>,
    ) -> Result<PlatformMessage>;

    /// List the chats visible to the connected account.
    async fn get_chats(&self) -> Result<Vec<PlatformChat>>;

    /// Fetch up to `limit` recent messages for one chat, oldest first.
    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<PlatformMessage>>;
}

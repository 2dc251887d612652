//! Collaborator interfaces for the dispatch pipeline.
//!
//! Each trait has a `Noop` implementation so the gateway can run standalone
//! before the host's persistence/AI/notification layers are wired in.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tracing::{debug, warn},
};

use botline_common::types::{
    AuthPrompt, ConnectionStatus, ContentType, Direction, PlatformType,
};

/// The logical thread of messages for one `(platform, chat_id)` pair.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub chatbot_id: String,
    pub platform: PlatformType,
    pub chat_id: String,
}

/// A message handed to persistence.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub direction: Direction,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: Option<serde_json::Value>,
}

/// A persisted message as returned by the store.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub content: String,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
}

// ── Conversations & messages ────────────────────────────────────────────────

/// Conversation/message persistence.
///
/// `find_or_create_conversation` must be atomic on `(platform, chat_id)`:
/// concurrent calls for the same pair return the same conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_or_create_conversation(
        &self,
        platform: PlatformType,
        chat_id: &str,
        chatbot_id: &str,
        tenant_id: &str,
    ) -> anyhow::Result<Conversation>;

    async fn save_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> anyhow::Result<StoredMessage>;
}

/// In-memory-free stand-in: deterministic conversation ids, messages are
/// acknowledged but not kept.
pub struct NoopConversationStore;

#[async_trait]
impl ConversationStore for NoopConversationStore {
    async fn find_or_create_conversation(
        &self,
        platform: PlatformType,
        chat_id: &str,
        chatbot_id: &str,
        tenant_id: &str,
    ) -> anyhow::Result<Conversation> {
        debug!(%platform, chat_id, "noop conversation store resolving conversation");
        Ok(Conversation {
            id: format!("conv-{platform}-{chat_id}"),
            tenant_id: tenant_id.to_string(),
            chatbot_id: chatbot_id.to_string(),
            platform,
            chat_id: chat_id.to_string(),
        })
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        message: NewMessage,
    ) -> anyhow::Result<StoredMessage> {
        Ok(StoredMessage {
            id: format!("msg-{}", uuid_ish(conversation_id, &message.content)),
            conversation_id: conversation_id.to_string(),
            direction: message.direction,
            content: message.content,
            content_type: message.content_type,
            created_at: Utc::now(),
        })
    }
}

fn uuid_ish(conversation_id: &str, content: &str) -> u64 {
    use std::hash::{DefaultHasher, Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    conversation_id.hash(&mut hasher);
    content.hash(&mut hasher);
    Utc::now().timestamp_micros().hash(&mut hasher);
    hasher.finish()
}

// ── AI response generation ──────────────────────────────────────────────────

/// Black-box reply generation. Failures propagate as pipeline-step errors
/// and no reply is sent for that message.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        conversation_id: &str,
        user_message: &str,
        chatbot_id: &str,
    ) -> anyhow::Result<String>;
}

/// Echo responder, useful until a real model is wired in.
pub struct NoopResponseGenerator;

#[async_trait]
impl ResponseGenerator for NoopResponseGenerator {
    async fn generate(
        &self,
        conversation_id: &str,
        user_message: &str,
        _chatbot_id: &str,
    ) -> anyhow::Result<String> {
        warn!(conversation_id, "no response generator wired in, echoing");
        Ok(format!(
            "Echo: {}",
            if user_message.is_empty() {
                "(no text)"
            } else {
                user_message
            }
        ))
    }
}

// ── Notifications ───────────────────────────────────────────────────────────

/// Fire-and-forget subscriber notifications (UI channels, webhooks). No
/// delivery guarantee is required of implementations.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_message(&self, tenant_id: &str, conversation_id: &str, message: &StoredMessage);

    async fn notify_status(&self, tenant_id: &str, connection_id: &str, status: ConnectionStatus);

    /// Surface an out-of-band login hint (QR code, OAuth URL) to operators.
    async fn notify_auth_prompt(
        &self,
        _tenant_id: &str,
        _connection_id: &str,
        _prompt: &AuthPrompt,
    ) {
    }
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_message(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
        _message: &StoredMessage,
    ) {
    }

    async fn notify_status(
        &self,
        _tenant_id: &str,
        _connection_id: &str,
        _status: ConnectionStatus,
    ) {
    }
}

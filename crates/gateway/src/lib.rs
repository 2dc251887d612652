//! Platform manager and message-dispatch pipeline.
//!
//! The gateway owns the adapter registry and lifecycle: it builds an adapter
//! per connection, consumes its event channel, persists status changes, and
//! runs inbound messages through conversation resolution → AI response →
//! outbound send.

pub mod factory;
pub mod manager;
pub mod pipeline;
pub mod services;

pub use {
    factory::{AdapterFactory, LiveAdapterFactory, breaker_config, retry_policy},
    manager::{ConnectionHealth, PlatformManager},
    services::{
        Conversation, ConversationStore, NewMessage, NoopConversationStore, NoopNotifier,
        NoopResponseGenerator, Notifier, ResponseGenerator, StoredMessage,
    },
};

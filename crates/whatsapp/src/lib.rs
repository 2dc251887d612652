//! WhatsApp Web adapter (automation-style).
//!
//! Drives the web client through a pooled headless browser: QR login,
//! DOM polling for unread chats, and UI-interaction sends.

pub mod adapter;
pub mod config;
pub mod dom;

pub use {adapter::WhatsAppAdapter, config::WhatsAppCredentials};

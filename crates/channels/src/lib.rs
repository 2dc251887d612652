//! Platform adapter abstraction.
//!
//! Each messaging platform (Mercado Libre, WhatsApp Web, ...) implements the
//! [`PlatformAdapter`] trait on top of a shared [`AdapterCore`] that owns the
//! status state machine, the event channel, and the retry/circuit-breaker
//! wrapper. The gateway consumes adapters through [`AdapterRegistry`].

pub mod adapter;
pub mod core;
pub mod error;
pub mod registry;
pub mod store;

pub use {
    adapter::{AdapterEvent, EventReceiver, EventSender, PlatformAdapter, event_channel},
    core::AdapterCore,
    error::{Error, Result},
    registry::AdapterRegistry,
    store::{ConnectionStore, StoredConnection},
};

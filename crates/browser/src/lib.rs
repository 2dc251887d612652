//! Browser resource pool for automation-style platform adapters.
//!
//! One long-lived browser process + page per connection id: web-client
//! logins carry per-tenant session state, so processes are never shared.

pub mod config;
pub mod detect;
pub mod error;
pub mod pool;

pub use {
    config::{AcquireOptions, BrowserPoolConfig},
    error::BrowserError,
    pool::BrowserPool,
};

//! Shared types and error definitions used across all botline crates.

pub mod error;
pub mod types;

pub use error::{BotlineError, Error, FromMessage, Result};

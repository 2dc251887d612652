//! Browser error types.

use thiserror::Error;

/// Errors that can occur during browser pool operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser not available: Chrome/Chromium not found. {0}")]
    BrowserNotAvailable(String),

    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("no browser for connection: {connection_id}")]
    NotFound { connection_id: String },

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript evaluation failed: {0}")]
    JsEvalFailed(String),

    #[error("pool exhausted: refusing to launch another browser")]
    PoolExhausted,

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl BrowserError {
    #[must_use]
    pub fn not_found(connection_id: impl Into<String>) -> Self {
        Self::NotFound {
            connection_id: connection_id.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Cdp(err.to_string())
    }
}

use std::error::Error as StdError;

use botline_common::types::PlatformType;

/// Crate-wide result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed adapter errors shared across all platform implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A required credential field is absent or empty. Never retried.
    #[error("missing credential for {platform}: {field}")]
    MissingCredential {
        platform: PlatformType,
        field: String,
    },

    /// The platform rejected the credentials or a verification step failed.
    /// Never retried.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Operation requires a connected adapter.
    #[error("adapter not connected: {platform}")]
    NotConnected { platform: PlatformType },

    /// No adapter is registered for the connection id.
    #[error("adapter not found: {connection_id}")]
    AdapterNotFound { connection_id: String },

    /// Operation is currently unavailable (resource gone, capability not
    /// supported by this platform).
    #[error("operation unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from a platform client, the retry wrapper, or
    /// the circuit breaker.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn missing_credential(platform: PlatformType, field: impl Into<String>) -> Self {
        Self::MissingCredential {
            platform,
            field: field.into(),
        }
    }

    #[must_use]
    pub fn auth_failed(message: impl std::fmt::Display) -> Self {
        Self::AuthenticationFailed {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_connected(platform: PlatformType) -> Self {
        Self::NotConnected { platform }
    }

    #[must_use]
    pub fn adapter_not_found(connection_id: impl Into<String>) -> Self {
        Self::AdapterNotFound {
            connection_id: connection_id.into(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: source.into(),
        }
    }
}

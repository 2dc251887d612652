//! Domain types shared by the adapter, gateway, and session crates.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Supported messaging platforms. Closed set: adding a platform means adding
/// an adapter crate and a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformType {
    /// Mercado Libre post-sale messaging (official seller REST API).
    #[serde(rename = "mercadolibre")]
    MercadoLibre,
    /// WhatsApp Web driven through a headless browser.
    #[serde(rename = "whatsapp-web")]
    WhatsappWeb,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MercadoLibre => "mercadolibre",
            Self::WhatsappWeb => "whatsapp-web",
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mercadolibre" => Ok(Self::MercadoLibre),
            "whatsapp-web" | "whatsapp" => Ok(Self::WhatsappWeb),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Lifecycle status of a platform connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Waiting for an out-of-band step (QR scan, OAuth consent, 2FA code).
    Authenticating,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a message relative to the connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Content kind of a message body or attachment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Document,
}

/// Individual buyer/contact thread or a group chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Individual,
    Group,
}

/// A message as seen by an adapter, normalized across platforms.
///
/// `id` is the platform-native identifier when the platform provides one and
/// a generated fallback otherwise. Fallback ids are best-effort: unique
/// enough for per-chat dedup, not stable keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: String,
    pub chat_id: String,
    pub direction: Direction,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PlatformMessage {
    /// Generate a fallback message id for platforms that do not hand one out.
    ///
    /// Not globally unique and not stable across restarts — callers must not
    /// key durable state on it.
    pub fn fallback_id() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("gen-{}", &id[..12])
    }
}

/// A chat/thread on a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformChat {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Optional attachment for an outbound send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Remote URL of the media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Local filesystem path of the media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub kind: ContentType,
}

/// Options for `send_message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    /// Platform message id to reply to, where the platform supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

/// How the operator completes a manual authentication step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Oauth,
    Qr,
    Verification,
}

/// Hint emitted while an adapter waits for out-of-band authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPrompt {
    pub method: AuthMethod,
    /// URL the operator should open (OAuth consent page, web client, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Opaque payload (e.g. QR code data) when the platform exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Platform credentials, one variant per platform. Validated at the
/// gateway boundary; each adapter only ever sees its own variant.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "platform")]
pub enum PlatformCredentials {
    #[serde(rename = "mercadolibre")]
    MercadoLibre {
        /// Application id from the developer console.
        app_id: String,
        #[serde(serialize_with = "serialize_secret")]
        client_secret: Secret<String>,
        #[serde(serialize_with = "serialize_secret")]
        access_token: Secret<String>,
        /// Seller user id. Resolved from the `/users/me` probe when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seller_id: Option<String>,
    },
    #[serde(rename = "whatsapp-web")]
    WhatsappWeb {
        /// Phone number bound to the account, informational only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone_number: Option<String>,
        /// Browser profile directory reused across logins so the QR scan
        /// survives restarts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        browser_profile: Option<String>,
    },
}

impl PlatformCredentials {
    pub fn platform(&self) -> PlatformType {
        match self {
            Self::MercadoLibre { .. } => PlatformType::MercadoLibre,
            Self::WhatsappWeb { .. } => PlatformType::WhatsappWeb,
        }
    }
}

impl fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MercadoLibre {
                app_id, seller_id, ..
            } => f
                .debug_struct("MercadoLibre")
                .field("app_id", app_id)
                .field("client_secret", &"[REDACTED]")
                .field("access_token", &"[REDACTED]")
                .field("seller_id", seller_id)
                .finish(),
            Self::WhatsappWeb {
                phone_number,
                browser_profile,
            } => f
                .debug_struct("WhatsappWeb")
                .field("phone_number", phone_number)
                .field("browser_profile", browser_profile)
                .finish(),
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Per-connection tuning knobs. Anything unset falls back to the platform
/// style's configured default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub poll_interval_secs: Option<u64>,
    /// Bound on the wait for a manual login step (QR scan etc.).
    pub login_timeout_secs: Option<u64>,
    /// Proxy URL handed through to the browser for automation platforms.
    pub proxy: Option<String>,
}

/// The single input contract a caller must satisfy to open a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnectionConfig {
    pub platform: PlatformType,
    pub credentials: PlatformCredentials,
    #[serde(default)]
    pub options: ConnectionOptions,
}

impl PlatformConnectionConfig {
    pub fn new(credentials: PlatformCredentials) -> Self {
        Self {
            platform: credentials.platform(),
            credentials,
            options: ConnectionOptions::default(),
        }
    }

    /// Check that `platform` and the credentials variant agree.
    pub fn validate(&self) -> Result<(), String> {
        let actual = self.credentials.platform();
        if actual != self.platform {
            return Err(format!(
                "credentials are for '{actual}' but the connection says '{}'",
                self.platform
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_type_round_trips_through_str() {
        for p in [PlatformType::MercadoLibre, PlatformType::WhatsappWeb] {
            let parsed: PlatformType = p.as_str().parse().unwrap();
            assert_eq!(parsed, p);
        }
        assert!("smoke-signals".parse::<PlatformType>().is_err());
    }

    #[test]
    fn fallback_ids_differ() {
        let a = PlatformMessage::fallback_id();
        let b = PlatformMessage::fallback_id();
        assert_ne!(a, b);
        assert!(a.starts_with("gen-"));
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = PlatformCredentials::MercadoLibre {
            app_id: "12345".into(),
            client_secret: Secret::new("hunter2".into()),
            access_token: Secret::new("APP_USR-token".into()),
            seller_id: Some("987".into()),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("APP_USR-token"));
    }

    #[test]
    fn config_validate_rejects_platform_mismatch() {
        let creds = PlatformCredentials::WhatsappWeb {
            phone_number: None,
            browser_profile: None,
        };
        let mut config = PlatformConnectionConfig::new(creds);
        assert!(config.validate().is_ok());
        config.platform = PlatformType::MercadoLibre;
        assert!(config.validate().is_err());
    }

    #[test]
    fn credentials_deserialize_by_tag() {
        let json = r#"{
            "platform": "mercadolibre",
            "app_id": "123",
            "client_secret": "s",
            "access_token": "t"
        }"#;
        let creds: PlatformCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.platform(), PlatformType::MercadoLibre);
    }
}

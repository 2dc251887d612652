//! Thin client for the Mercado Libre post-sale messaging API.

use std::time::Duration;

use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

pub const DEFAULT_BASE_URL: &str = "https://api.mercadolibre.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("mercadolibre api returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("mercadolibre request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Token rejected or insufficient permissions — never retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MeliUser {
    pub id: u64,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnreadResponse {
    #[serde(default)]
    results: Vec<UnreadResult>,
}

#[derive(Debug, Deserialize)]
struct UnreadResult {
    resource: String,
    count: u32,
}

/// A pack (buyer thread) with unread messages.
#[derive(Debug, Clone)]
pub struct UnreadThread {
    pub pack_id: String,
    pub count: u32,
}

#[derive(Debug, Deserialize)]
struct PackMessagesResponse {
    #[serde(default)]
    messages: Vec<MeliMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub from: MeliParty,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message_date: Option<MeliMessageDate>,
    #[serde(default)]
    pub message_attachments: Option<Vec<MeliAttachment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliParty {
    pub user_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliMessageDate {
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeliAttachment {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// HTTP client bound to one seller access token.
pub struct MeliClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Secret<String>,
}

impl MeliClient {
    pub fn new(
        access_token: Secret<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            access_token,
        })
    }

    /// Lightweight connectivity + token probe.
    pub async fn me(&self) -> Result<MeliUser, ApiError> {
        self.get_json(&format!("{}/users/me", self.base_url)).await
    }

    /// Packs with unread post-sale messages, seller side.
    pub async fn unread_threads(&self) -> Result<Vec<UnreadThread>, ApiError> {
        let url = format!("{}/messages/unread?role=seller&tag=post_sale", self.base_url);
        let response: UnreadResponse = self.get_json(&url).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(|r| {
                parse_pack_id(&r.resource).map(|pack_id| UnreadThread {
                    pack_id,
                    count: r.count,
                })
            })
            .collect())
    }

    /// Messages of one pack, oldest first (API order).
    pub async fn pack_messages(
        &self,
        pack_id: &str,
        seller_id: u64,
        limit: usize,
    ) -> Result<Vec<MeliMessage>, ApiError> {
        let url = format!(
            "{}/messages/packs/{pack_id}/sellers/{seller_id}?tag=post_sale&mark_as_read=false&limit={limit}",
            self.base_url
        );
        let response: PackMessagesResponse = self.get_json(&url).await?;
        Ok(response.messages)
    }

    /// Send a seller message into a pack. Returns the platform message id
    /// when the API hands one back.
    pub async fn send_message(
        &self,
        pack_id: &str,
        seller_id: u64,
        to_user_id: u64,
        text: &str,
        attachments: &[String],
    ) -> Result<Option<String>, ApiError> {
        let url = format!(
            "{}/messages/packs/{pack_id}/sellers/{seller_id}?tag=post_sale",
            self.base_url
        );
        let mut body = serde_json::json!({
            "from": { "user_id": seller_id },
            "to": { "user_id": to_user_id },
            "text": text,
        });
        if !attachments.is_empty() {
            body["attachments"] = serde_json::json!(attachments);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let value: serde_json::Value = check(response).await?.json().await?;
        Ok(value
            .get("id")
            .and_then(|id| id.as_str())
            .map(String::from))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Extract the pack id out of an unread `resource` path like
/// `/packs/2000000077549428` or `/packs/2000000077549428/sellers/123`.
fn parse_pack_id(resource: &str) -> Option<String> {
    let mut segments = resource.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "packs" {
            return segments.next().map(String::from);
        }
    }
    None
}

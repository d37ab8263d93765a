//! HTTP client for the WhatsApp bridge.
//!
//! All outbound WhatsApp operations go through this client, which talks to a
//! phone-bridge gateway over plain HTTP. Every call is an independent request
//! on a shared `reqwest::Client`, so the client is safe to use from many
//! pipeline tasks at once.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::WhatsAppError;
use crate::message::{Media, MediaKind};

/// Client for the WhatsApp HTTP bridge.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
}

/// Connection status reported by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppStatus {
    /// Whether the bridge is connected to WhatsApp.
    pub connected: bool,
    /// The phone number linked, if connected.
    pub phone_number: Option<String>,
}

/// Media payload exchanged with the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BridgeMedia {
    mime_type: String,
    /// Base64-encoded content.
    data: String,
    #[serde(default)]
    file_name: Option<String>,
}

/// Response envelope from the bridge HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> BridgeResponse<T> {
    /// Payload of a successful reply, or the bridge's own error text.
    fn into_data(self, what: &str) -> Result<T, WhatsAppError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(WhatsAppError::Bridge(format!("bridge sent no {what}"))),
            (false, _) => Err(WhatsAppError::Bridge(
                self.error
                    .unwrap_or_else(|| format!("bridge refused {what} request")),
            )),
        }
    }
}

impl WhatsAppClient {
    /// Create a new client pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: crate::transport::http_client(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Returns the base URL of the bridge.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the current connection status from the bridge.
    pub async fn status(&self) -> Result<WhatsAppStatus, WhatsAppError> {
        let url = format!("{}/status", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let body: BridgeResponse<WhatsAppStatus> = resp.json().await?;
        body.into_data("status")
    }

    /// Send a text message, optionally quoting an earlier message.
    pub async fn send_text(
        &self,
        jid: &str,
        text: &str,
        quoted: Option<&str>,
    ) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "text": text, "quoted": quoted });
        self.post("send", &body).await?;
        debug!(jid, "message sent via WhatsApp");
        Ok(())
    }

    /// Send an image or audio clip.
    pub async fn send_media(
        &self,
        jid: &str,
        kind: MediaKind,
        media: &Media,
        caption: Option<&str>,
    ) -> Result<(), WhatsAppError> {
        let kind = match kind {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        };
        let body = serde_json::json!({
            "jid": jid,
            "kind": kind,
            "caption": caption,
            "media": BridgeMedia {
                mime_type: media.mime_type.clone(),
                data: BASE64.encode(&media.bytes),
                file_name: media.file_name.clone(),
            },
        });
        self.post("send-media", &body).await?;
        debug!(jid, kind, "media sent via WhatsApp");
        Ok(())
    }

    /// React to a message with an emoji.
    pub async fn react(&self, jid: &str, message_id: &str, emoji: &str) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "message_id": message_id, "emoji": emoji });
        self.post("react", &body).await
    }

    /// Mark messages in a conversation as read.
    pub async fn mark_read(&self, jid: &str, message_id: Option<&str>) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "message_id": message_id });
        self.post("mark-read", &body).await
    }

    /// Flag a conversation as unread.
    pub async fn mark_unread(&self, jid: &str) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid });
        self.post("mark-unread", &body).await
    }

    /// Delete a message for everyone.
    pub async fn delete(&self, jid: &str, message_id: &str) -> Result<(), WhatsAppError> {
        let body = serde_json::json!({ "jid": jid, "message_id": message_id });
        self.post("delete", &body).await
    }

    /// Send a typing indicator (composing) to the given JID.
    ///
    /// Fire-and-forget: typing indicators are cosmetic and must never block
    /// message delivery.
    pub async fn send_typing(&self, jid: &str) -> Result<(), WhatsAppError> {
        let url = format!("{}/typing", self.base_url);
        let body = serde_json::json!({ "jid": jid });
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            debug!(jid, error = %e, "typing indicator failed");
        }
        Ok(())
    }

    /// Download the media attached to a message.
    pub async fn download_media(&self, message_id: &str) -> Result<Media, WhatsAppError> {
        let url = format!("{}/media/{message_id}", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let body: BridgeResponse<BridgeMedia> = resp.json().await?;
        let media = body.into_data(&format!("media for message {message_id}"))?;
        let bytes = BASE64
            .decode(media.data.as_bytes())
            .map_err(|e| WhatsAppError::Bridge(format!("invalid media encoding: {e}")))?;
        Ok(Media {
            mime_type: media.mime_type,
            bytes,
            file_name: media.file_name,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<(), WhatsAppError> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            warn!(%status, path, "WhatsApp bridge call failed: {body_text}");
            return Err(WhatsAppError::Bridge(format!("{path} returned {status}")));
        }
        Ok(())
    }
}

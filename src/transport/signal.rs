//! Signal adapter backed by signal-cli-rest-api.
//!
//! Inbound envelopes stream over the `/v1/receive/{number}` WebSocket (the
//! bridge must run in `json-rpc` mode). Outbound calls use the REST endpoints.
//! Group chats are addressed as `group.<base64 of internal group id>`, the
//! same form the bridge's `recipients` field expects.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info};

use crate::config::SignalConfig;
use crate::dispatch::DispatchEngine;
use crate::message::{CanonicalMessage, ChatId, Media, MediaKind, MediaRef, Platform};

use super::{check_response, http_client, local_id_for, reconnect_forever, Progress, Transport, TransportError};

/// Prefix of group recipients.
pub const GROUP_PREFIX: &str = "group.";

/// Top-level frame from the receive socket.
#[derive(Debug, Deserialize)]
pub struct Frame {
    /// Signal envelope.
    pub envelope: Envelope,
}

/// A Signal envelope; only data and sync messages are relevant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Sender phone number.
    #[serde(default)]
    pub source_number: Option<String>,
    /// Sender UUID, used when the number is hidden.
    #[serde(default)]
    pub source_uuid: Option<String>,
    /// Sender profile name.
    #[serde(default)]
    pub source_name: Option<String>,
    /// Message from someone else.
    #[serde(default)]
    pub data_message: Option<DataMessage>,
    /// Message sent from another device of our own account.
    #[serde(default)]
    pub sync_message: Option<SyncMessage>,
}

/// Message body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    /// Millisecond timestamp, which doubles as the message id.
    pub timestamp: i64,
    /// Text body.
    #[serde(default)]
    pub message: Option<String>,
    /// Set for group messages.
    #[serde(default)]
    pub group_info: Option<GroupInfo>,
    /// Mentioned accounts.
    #[serde(default)]
    pub mentions: Vec<Mention>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Sync wrapper for messages we sent elsewhere.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// The message we sent.
    #[serde(default)]
    pub sent_message: Option<SentMessage>,
}

/// A message sent by our own account.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    /// Direct-chat recipient.
    #[serde(default)]
    pub destination_number: Option<String>,
    /// Body, same shape as a data message.
    #[serde(flatten)]
    pub data: DataMessage,
}

/// Group descriptor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    /// Internal group id, base64.
    pub group_id: String,
}

/// A mention span.
#[derive(Debug, Deserialize)]
pub struct Mention {
    /// Mentioned number.
    #[serde(default)]
    pub number: Option<String>,
}

/// Attachment metadata.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Bridge attachment id.
    pub id: String,
    /// MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Original file name.
    #[serde(default)]
    pub filename: Option<String>,
}

/// Recipient string for a group's internal id.
pub fn group_recipient(internal_id: &str) -> String {
    format!("{GROUP_PREFIX}{}", BASE64.encode(internal_id.as_bytes()))
}

/// Translate an envelope into the canonical model. Envelopes without a message
/// body (receipts, typing) yield `None`.
pub fn canonicalize(envelope: Envelope, own_number: &str) -> Option<CanonicalMessage> {
    let sender_id = envelope
        .source_number
        .clone()
        .or_else(|| envelope.source_uuid.clone())
        .unwrap_or_default();

    let (data, is_self_authored, direct_peer) = match (envelope.data_message, envelope.sync_message) {
        (Some(data), _) => (data, false, Some(sender_id.clone())),
        (None, Some(SyncMessage { sent_message: Some(sent) })) => {
            (sent.data, true, sent.destination_number)
        }
        _ => return None,
    };

    let is_group = data.group_info.is_some();
    let local = match &data.group_info {
        Some(group) => group_recipient(&group.group_id),
        None => direct_peer?,
    };

    let is_bot_mentioned = data
        .mentions
        .iter()
        .any(|m| m.number.as_deref() == Some(own_number));

    let media = data.attachments.first().map(|a| {
        let mime = a.content_type.clone();
        MediaRef {
            kind: mime
                .as_deref()
                .map_or(MediaKind::Document, MediaKind::from_mime),
            mime_type: mime,
            locator: a.id.clone(),
        }
    });

    let received_at = DateTime::<Utc>::from_timestamp_millis(data.timestamp).unwrap_or_else(Utc::now);

    Some(CanonicalMessage {
        platform: Platform::Signal,
        chat_id: ChatId::new(Platform::Signal, local),
        message_id: data.timestamp.to_string(),
        sender_name: envelope.source_name.unwrap_or_else(|| sender_id.clone()),
        sender_id,
        text: data.message.unwrap_or_default(),
        is_group,
        is_self_authored,
        is_bot_mentioned,
        media,
        received_at,
    })
}

/// Signal transport.
pub struct SignalTransport {
    http: reqwest::Client,
    base_url: String,
    number: String,
}

impl SignalTransport {
    /// Create a transport from its config section.
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            http: http_client(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            number: config.number.clone(),
        }
    }

    /// WebSocket URL of the receive stream.
    pub fn receive_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/v1/receive/{}", self.number)
    }

    async fn session(&self, engine: &Arc<DispatchEngine>) -> Result<(), TransportError> {
        let (mut stream, _) = tokio_tungstenite::connect_async(self.receive_url()).await?;
        info!(number = %self.number, "signal receive stream connected");

        while let Some(frame) = stream.next().await {
            match frame? {
                WsMessage::Text(text) => {
                    let frame: Frame = match serde_json::from_str(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(error = %e, "ignoring undecodable signal frame");
                            continue;
                        }
                    };
                    if let Some(message) = canonicalize(frame.envelope, &self.number) {
                        engine.dispatch(message);
                    }
                }
                WsMessage::Close(_) => return Ok(()),
                _ => {}
            }
        }
        Err(TransportError::Closed)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), TransportError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.post(&url).json(&body).send().await?;
        check_response(resp).await?;
        Ok(())
    }

    async fn send(
        &self,
        recipient: &str,
        text: &str,
        attachment: Option<&Media>,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({
            "number": self.number,
            "recipients": [recipient],
            "message": text,
        });
        if let Some(media) = attachment {
            body["base64_attachments"] = serde_json::json!([format!(
                "data:{};base64,{}",
                media.mime_type,
                BASE64.encode(&media.bytes)
            )]);
        }
        self.post("/v2/send", body).await
    }
}

#[async_trait]
impl Transport for SignalTransport {
    fn platform(&self) -> Platform {
        Platform::Signal
    }

    async fn run(self: Arc<Self>, engine: Arc<DispatchEngine>) {
        reconnect_forever(Platform::Signal, || self.session(&engine)).await;
    }

    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, chat)?;
        self.send(recipient, text, None).await
    }

    async fn send_to_group(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        if local_id.starts_with(GROUP_PREFIX) {
            self.send(local_id, text, None).await
        } else {
            self.send(&group_recipient(local_id), text, None).await
        }
    }

    async fn mark_progress(
        &self,
        message: &CanonicalMessage,
        progress: Progress,
    ) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, &message.chat_id)?;
        let body = serde_json::json!({
            "recipient": recipient,
            "reaction": progress.emoji(),
            "target_author": message.sender_id,
            "timestamp": timestamp_of(message)?,
        });
        self.post(&format!("/v1/reactions/{}", self.number), body).await
    }

    async fn mark_seen(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "receipt_type": "read",
            "recipient": message.sender_id,
            "timestamp": timestamp_of(message)?,
        });
        self.post(&format!("/v1/receipts/{}", self.number), body).await
    }

    async fn send_typing(&self, chat: &ChatId) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, chat)?;
        let url = format!("{}/v1/typing-indicator/{}", self.base_url, self.number);
        let resp = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "recipient": recipient }))
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    async fn send_image(
        &self,
        chat: &ChatId,
        image: Media,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, chat)?;
        self.send(recipient, caption.unwrap_or_default(), Some(&image))
            .await
    }

    async fn send_audio(&self, chat: &ChatId, audio: Media) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, chat)?;
        self.send(recipient, "", Some(&audio)).await
    }

    async fn delete_message(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let recipient = local_id_for(Platform::Signal, &message.chat_id)?;
        let url = format!("{}/v1/remote-delete/{}", self.base_url, self.number);
        let body = serde_json::json!({
            "recipient": recipient,
            "timestamp": timestamp_of(message)?,
        });
        let resp = self.http.delete(&url).json(&body).send().await?;
        check_response(resp).await?;
        Ok(())
    }

    async fn download_media(
        &self,
        message: &CanonicalMessage,
    ) -> Result<Option<Media>, TransportError> {
        let Some(media) = &message.media else {
            return Ok(None);
        };
        let url = format!("{}/v1/attachments/{}", self.base_url, media.locator);
        let resp = check_response(self.http.get(&url).send().await?).await?;
        let bytes = resp.bytes().await?.to_vec();
        let mime = media
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_owned());
        Ok(Some(Media::new(mime, bytes).with_file_name(media.locator.clone())))
    }
}

fn timestamp_of(message: &CanonicalMessage) -> Result<i64, TransportError> {
    message
        .message_id
        .parse()
        .map_err(|_| TransportError::InvalidChat(format!("bad signal timestamp {}", message.message_id)))
}

//! Long-poll event stream from the WhatsApp bridge.
//!
//! The bridge's `/events/poll` endpoint holds each request open until events
//! arrive or the poll times out. A poll timeout is normal and simply starts the
//! next poll; any other network error ends the session so the receive loop can
//! reconnect. Events are decoded one by one: an event this client does not
//! understand is logged and skipped without losing the rest of its batch.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::transport::TransportError;

/// An incoming WhatsApp event from the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum WhatsAppEvent {
    /// A new message was received (or sent by us from another device).
    #[serde(rename = "message")]
    Message(InboundMessage),
    /// WhatsApp connection established.
    #[serde(rename = "connected")]
    Connected,
    /// WhatsApp connection lost.
    #[serde(rename = "disconnected")]
    Disconnected {
        /// Human-readable reason, if available.
        reason: Option<String>,
    },
}

/// Payload of a `message` event.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// WhatsApp JID of the conversation.
    pub jid: String,
    /// Message text or media caption.
    #[serde(default)]
    pub text: String,
    /// Whether this message was sent by our own account.
    #[serde(default)]
    pub from_me: bool,
    /// Bridge-assigned message identifier.
    pub message_id: String,
    /// Author JID inside a group; absent in direct chats.
    #[serde(default)]
    pub participant: Option<String>,
    /// Sender's profile name.
    #[serde(default)]
    pub push_name: Option<String>,
    /// Explicit group flag, when the bridge provides one.
    #[serde(default)]
    pub is_group: Option<bool>,
    /// JIDs mentioned in the message.
    #[serde(default)]
    pub mentioned: Vec<String>,
    /// MIME type of an attached media item.
    #[serde(default)]
    pub media_mime: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Long-poll timeout for the HTTP client (seconds).
pub const POLL_TIMEOUT_SECS: u64 = 60;

/// Decode a poll batch, dropping entries that do not decode.
pub fn decode_events(batch: Vec<serde_json::Value>) -> Vec<WhatsAppEvent> {
    batch
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<WhatsAppEvent>(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "skipping undecodable WhatsApp event");
                None
            }
        })
        .collect()
}

/// Poll the bridge until a non-timeout network error occurs.
///
/// Every decoded event is passed to `on_event` inline, in arrival order.
pub async fn poll_events<F>(poll_url: &str, mut on_event: F) -> Result<(), TransportError>
where
    F: FnMut(WhatsAppEvent) + Send,
{
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_SECS))
        .build()?;

    loop {
        match client.get(poll_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let batch = resp.json::<Vec<serde_json::Value>>().await?;
                for event in decode_events(batch) {
                    debug!(?event, "received WhatsApp event");
                    on_event(event);
                }
            }
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Backend { status, body });
            }
            // Long-poll expired without events: poll again.
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

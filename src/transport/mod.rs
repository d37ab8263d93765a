//! Transport abstraction: one adapter per messaging backend.
//!
//! Every adapter implements the full [`Transport`] capability set. Operations a
//! backend cannot perform are no-ops returning `Ok(())`, so pipeline code never
//! branches on the platform. Each adapter owns exactly one receive loop
//! ([`Transport::run`]) that canonicalizes inbound payloads inline and hands
//! them to the [`DispatchEngine`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::dispatch::DispatchEngine;
use crate::message::{CanonicalMessage, ChatId, Media, Platform};

pub mod instagram;
pub mod registry;
pub mod signal;
pub mod telegram;
pub mod telethon;
pub mod whatsapp;

pub use registry::TransportRegistry;

/// Fixed delay between reconnect attempts of a receive loop.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// HTTP connect timeout for outbound backend clients.
pub(crate) const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for outbound backend calls.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Processing indicator attached to the triggering message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Work accepted (0%).
    Started,
    /// Work half done (50%).
    Halfway,
    /// Work finished successfully.
    Done,
    /// Work failed.
    Failed,
    /// The pipeline recognized the message but chose not to act on it.
    Skipped,
}

impl Progress {
    /// Reaction emoji used by backends that express progress as reactions.
    pub fn emoji(self) -> &'static str {
        match self {
            Progress::Started => "\u{23F3}",
            Progress::Halfway => "\u{1F504}",
            Progress::Done => "\u{2705}",
            Progress::Failed => "\u{274C}",
            Progress::Skipped => "\u{1F937}",
        }
    }
}

/// Errors from backend communication.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request to the backend failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket connection failed or closed abnormally.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Telegram Bot API request failed.
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Telegram file download failed.
    #[error("telegram download failed: {0}")]
    TelegramDownload(#[from] teloxide::DownloadError),

    /// WhatsApp bridge error.
    #[error(transparent)]
    WhatsApp(#[from] whatsapp::WhatsAppError),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// A payload could not be decoded.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// A chat id belonging to another platform was passed to this adapter.
    #[error("chat {0} does not belong to this transport")]
    ForeignChat(ChatId),

    /// The chat id cannot be expressed in the backend's native form.
    #[error("invalid backend chat id: {0}")]
    InvalidChat(String),

    /// The stream ended unexpectedly.
    #[error("connection closed")]
    Closed,
}

/// Capability set every messaging backend exposes.
///
/// Only [`platform`](Transport::platform), [`run`](Transport::run) and
/// [`send_text`](Transport::send_text) are required. All other operations
/// default to a no-op returning `Ok(())` (or `Ok(None)` for downloads);
/// adapters override what their backend supports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Platform served by this adapter.
    fn platform(&self) -> Platform;

    /// Receive loop. Runs for the process lifetime, reconnecting after errors.
    async fn run(self: Arc<Self>, engine: Arc<DispatchEngine>);

    /// Send a text message to a chat.
    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), TransportError>;

    /// Reply to a message. Defaults to a plain send into the same chat.
    async fn reply(&self, message: &CanonicalMessage, text: &str) -> Result<(), TransportError> {
        self.send_text(&message.chat_id, text).await
    }

    /// Send text to a group by its backend-local id.
    async fn send_to_group(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        self.send_text(&ChatId::new(self.platform(), local_id), text)
            .await
    }

    /// Send text to an individual by its backend-local id.
    async fn send_to_individual(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        self.send_text(&ChatId::new(self.platform(), local_id), text)
            .await
    }

    /// Attach a progress indicator to a message. No-op by default.
    async fn mark_progress(
        &self,
        _message: &CanonicalMessage,
        _progress: Progress,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Mark a message as read. No-op by default.
    async fn mark_seen(&self, _message: &CanonicalMessage) -> Result<(), TransportError> {
        Ok(())
    }

    /// Mark a chat as unread. No-op by default.
    async fn mark_unseen(&self, _message: &CanonicalMessage) -> Result<(), TransportError> {
        Ok(())
    }

    /// Show a typing indicator. No-op by default.
    async fn send_typing(&self, _chat: &ChatId) -> Result<(), TransportError> {
        Ok(())
    }

    /// Send an image with an optional caption. No-op by default.
    async fn send_image(
        &self,
        _chat: &ChatId,
        _image: Media,
        _caption: Option<&str>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Send an audio clip. No-op by default.
    async fn send_audio(&self, _chat: &ChatId, _audio: Media) -> Result<(), TransportError> {
        Ok(())
    }

    /// Delete a message. No-op by default.
    async fn delete_message(&self, _message: &CanonicalMessage) -> Result<(), TransportError> {
        Ok(())
    }

    /// Download the media attached to a message. `Ok(None)` by default.
    async fn download_media(
        &self,
        _message: &CanonicalMessage,
    ) -> Result<Option<Media>, TransportError> {
        Ok(None)
    }

    /// Whether the message came from a group chat.
    fn is_group(&self, message: &CanonicalMessage) -> bool {
        message.is_group
    }

    /// Whether the bot's own account authored the message.
    fn is_self(&self, message: &CanonicalMessage) -> bool {
        message.is_self_authored
    }

    /// Whether the bot account is mentioned in the message.
    fn is_bot_mentioned(&self, message: &CanonicalMessage) -> bool {
        message.is_bot_mentioned
    }

    /// Message text.
    fn text<'a>(&self, message: &'a CanonicalMessage) -> &'a str {
        &message.text
    }

    /// Canonical chat id of the message.
    fn chat_id<'a>(&self, message: &'a CanonicalMessage) -> &'a ChatId {
        &message.chat_id
    }

    /// Display name of the sender.
    fn sender_name<'a>(&self, message: &'a CanonicalMessage) -> &'a str {
        &message.sender_name
    }
}

/// Drive a receive loop forever: connect, serve until error, wait, retry.
///
/// `session` performs one CONNECTING -> CONNECTED lifetime and returns when the
/// connection ends. Retries are unbounded with a fixed [`RECONNECT_DELAY`].
pub async fn reconnect_forever<F, Fut>(platform: Platform, mut session: F)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), TransportError>> + Send,
{
    loop {
        info!(%platform, "connecting receive loop");
        match session().await {
            Ok(()) => info!(%platform, "receive loop disconnected"),
            Err(e) => warn!(%platform, error = %e, "receive loop failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Recover the backend-local id from a chat id owned by `platform`.
pub(crate) fn local_id_for(platform: Platform, chat: &ChatId) -> Result<&str, TransportError> {
    if chat.platform() == Some(platform) {
        Ok(chat.local_id())
    } else {
        Err(TransportError::ForeignChat(chat.clone()))
    }
}

/// Build a reqwest client with the standard backend timeouts.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build HTTP client with timeouts, using default");
            reqwest::Client::default()
        })
}

/// Turn a non-success HTTP response into [`TransportError::Backend`].
pub(crate) async fn check_response(
    resp: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    Err(TransportError::Backend {
        status: status.as_u16(),
        body,
    })
}

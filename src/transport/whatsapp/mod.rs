//! WhatsApp adapter: HTTP bridge client and long-poll receive loop.
//!
//! Talks to a phone-bridge gateway over HTTP. Inbound messages arrive via the
//! bridge's `/events/poll` long-polling endpoint and are canonicalized inline
//! on the receive loop. Group chats are JIDs ending in `@g.us`; individuals end
//! in `@c.us` (or `@s.whatsapp.net` on multi-device bridges).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::WhatsAppConfig;
use crate::dispatch::DispatchEngine;
use crate::message::{CanonicalMessage, ChatId, Media, MediaKind, MediaRef, Platform};

use super::{local_id_for, reconnect_forever, Progress, Transport, TransportError};

pub mod client;
pub mod events;

pub use client::WhatsAppClient;
use events::{InboundMessage, WhatsAppEvent};

/// JID suffix of group chats.
pub const GROUP_SUFFIX: &str = "@g.us";

/// JID suffix of individual chats.
pub const INDIVIDUAL_SUFFIX: &str = "@c.us";

/// Errors from the WhatsApp bridge.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the bridge failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge rejected or could not complete a call.
    #[error("bridge error: {0}")]
    Bridge(String),
}

/// WhatsApp transport backed by the HTTP bridge.
pub struct WhatsAppTransport {
    client: WhatsAppClient,
    /// Bot account number, from config or learned from `/status`.
    own_number: RwLock<Option<String>>,
}

impl WhatsAppTransport {
    /// Create a transport from its config section.
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: WhatsAppClient::new(config.bridge_url.clone()),
            own_number: RwLock::new(config.phone_number.clone()),
        }
    }

    fn own_number(&self) -> Option<String> {
        self.own_number.read().ok().and_then(|n| n.clone())
    }

    /// One connected lifetime: learn our number, then long-poll until failure.
    async fn session(&self, engine: &Arc<DispatchEngine>) -> Result<(), TransportError> {
        let status = self.client.status().await?;
        info!(
            connected = status.connected,
            phone = status.phone_number.as_deref().unwrap_or("-"),
            "WhatsApp bridge reachable"
        );
        if let Some(number) = status.phone_number {
            if let Ok(mut own) = self.own_number.write() {
                own.get_or_insert(number);
            }
        }

        let own_number = self.own_number();
        let poll_url = format!("{}/events/poll", self.client.base_url());
        events::poll_events(&poll_url, |event| match event {
            WhatsAppEvent::Message(inbound) => {
                engine.dispatch(canonicalize(&inbound, own_number.as_deref()));
            }
            WhatsAppEvent::Connected => info!("WhatsApp connected"),
            WhatsAppEvent::Disconnected { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "WhatsApp disconnected");
            }
        })
        .await
    }
}

/// Whether a JID addresses a group chat.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

/// Strip any JID domain, leaving the phone number or group key.
fn jid_user(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Translate a bridge message into the canonical model.
pub fn canonicalize(inbound: &InboundMessage, own_number: Option<&str>) -> CanonicalMessage {
    let is_group = inbound
        .is_group
        .unwrap_or_else(|| is_group_jid(&inbound.jid));
    let sender_id = inbound
        .participant
        .clone()
        .unwrap_or_else(|| inbound.jid.clone());
    let sender_name = inbound
        .push_name
        .clone()
        .unwrap_or_else(|| jid_user(&sender_id).to_owned());

    let is_bot_mentioned = own_number.is_some_and(|own| {
        let own = own.trim_start_matches('+');
        inbound.mentioned.iter().any(|jid| jid_user(jid) == own)
            || inbound.text.contains(&format!("@{own}"))
    });

    let media = inbound.media_mime.as_ref().map(|mime| MediaRef {
        kind: MediaKind::from_mime(mime),
        mime_type: Some(mime.clone()),
        locator: inbound.message_id.clone(),
    });

    let received_at = inbound
        .timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    CanonicalMessage {
        platform: Platform::WhatsApp,
        chat_id: ChatId::new(Platform::WhatsApp, &inbound.jid),
        message_id: inbound.message_id.clone(),
        sender_id,
        sender_name,
        text: inbound.text.clone(),
        is_group,
        is_self_authored: inbound.from_me,
        is_bot_mentioned,
        media,
        received_at,
    }
}

/// Complete a bare number or group key with the proper JID suffix.
fn with_suffix(local_id: &str, suffix: &str) -> String {
    if local_id.contains('@') {
        local_id.to_owned()
    } else {
        format!("{}{suffix}", local_id.trim_start_matches('+'))
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    async fn run(self: Arc<Self>, engine: Arc<DispatchEngine>) {
        reconnect_forever(Platform::WhatsApp, || self.session(&engine)).await;
    }

    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, chat)?;
        Ok(self.client.send_text(jid, text, None).await?)
    }

    async fn reply(&self, message: &CanonicalMessage, text: &str) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, &message.chat_id)?;
        Ok(self
            .client
            .send_text(jid, text, Some(&message.message_id))
            .await?)
    }

    async fn send_to_group(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        let jid = with_suffix(local_id, GROUP_SUFFIX);
        Ok(self.client.send_text(&jid, text, None).await?)
    }

    async fn send_to_individual(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        let jid = with_suffix(local_id, INDIVIDUAL_SUFFIX);
        Ok(self.client.send_text(&jid, text, None).await?)
    }

    async fn mark_progress(
        &self,
        message: &CanonicalMessage,
        progress: Progress,
    ) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, &message.chat_id)?;
        Ok(self
            .client
            .react(jid, &message.message_id, progress.emoji())
            .await?)
    }

    async fn mark_seen(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, &message.chat_id)?;
        Ok(self
            .client
            .mark_read(jid, Some(&message.message_id))
            .await?)
    }

    async fn mark_unseen(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, &message.chat_id)?;
        Ok(self.client.mark_unread(jid).await?)
    }

    async fn send_typing(&self, chat: &ChatId) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, chat)?;
        Ok(self.client.send_typing(jid).await?)
    }

    async fn send_image(
        &self,
        chat: &ChatId,
        image: Media,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, chat)?;
        Ok(self
            .client
            .send_media(jid, MediaKind::Image, &image, caption)
            .await?)
    }

    async fn send_audio(&self, chat: &ChatId, audio: Media) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, chat)?;
        Ok(self
            .client
            .send_media(jid, MediaKind::Audio, &audio, None)
            .await?)
    }

    async fn delete_message(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let jid = local_id_for(Platform::WhatsApp, &message.chat_id)?;
        Ok(self.client.delete(jid, &message.message_id).await?)
    }

    async fn download_media(
        &self,
        message: &CanonicalMessage,
    ) -> Result<Option<Media>, TransportError> {
        match &message.media {
            Some(media) => Ok(Some(self.client.download_media(&media.locator).await?)),
            None => Ok(None),
        }
    }
}

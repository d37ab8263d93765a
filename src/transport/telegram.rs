//! Telegram adapter on the Bot API via teloxide.
//!
//! The receive loop runs a teloxide [`Dispatcher`] whose single endpoint
//! canonicalizes each message and hands it to the [`DispatchEngine`]. Reactions
//! are not covered by teloxide 0.13, so progress markers go through a direct
//! `setMessageReaction` call. Replies quote the triggering message through
//! `reply_parameters`. Telegram has no read-state API for bots, so
//! `mark_seen`/`mark_unseen` keep their no-op defaults.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::net::Download;
use teloxide::payloads::setters::*;
use teloxide::requests::{Requester, ResponseResult};
use teloxide::types::{
    ChatAction, ChatId as TgChatId, InputFile, Message, MessageId, ReplyParameters, Update,
    UserId,
};
use teloxide::Bot;
use tracing::{debug, info};

use crate::config::{ConfigError, TelegramConfig};
use crate::dispatch::DispatchEngine;
use crate::message::{CanonicalMessage, ChatId, Media, MediaKind, MediaRef, Platform};

use super::{check_response, http_client, local_id_for, reconnect_forever, Progress, Transport, TransportError};

/// Public Bot API server.
const API_BASE: &str = "https://api.telegram.org";

/// Identity of the bot account, learned from `getMe` on connect.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    /// Numeric user id.
    pub id: UserId,
    /// `@username` without the `@`.
    pub username: Option<String>,
}

/// Telegram Bot API transport.
pub struct TelegramTransport {
    bot: Bot,
    token: String,
    api_base: String,
    http: reqwest::Client,
}

impl TelegramTransport {
    /// Create a transport for the given bot token.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bot: Bot::new(token.clone()),
            token,
            api_base: API_BASE.to_owned(),
            http: http_client(),
        }
    }

    /// Create a transport from its config section and resolved token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `api_url` does not parse.
    pub fn from_config(
        config: &TelegramConfig,
        token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let transport = Self::new(token);
        let Some(api_url) = &config.api_url else {
            return Ok(transport);
        };
        let api_url = reqwest::Url::parse(api_url).map_err(|e| ConfigError::InvalidUrl {
            field: "transports.telegram.api_url",
            error: e.to_string(),
        })?;
        Ok(transport.with_api_url(api_url))
    }

    /// Point every Bot API call at another server.
    pub fn with_api_url(mut self, api_url: reqwest::Url) -> Self {
        self.api_base = api_url.as_str().trim_end_matches('/').to_owned();
        self.bot = self.bot.set_api_url(api_url);
        self
    }

    async fn session(&self, engine: &Arc<DispatchEngine>) -> Result<(), TransportError> {
        let me = self.bot.get_me().await?;
        let identity = BotIdentity {
            id: me.user.id,
            username: me.user.username.clone(),
        };
        info!(
            username = identity.username.as_deref().unwrap_or("-"),
            "telegram dispatcher starting"
        );

        let handler = Update::filter_message().endpoint(handle_message);
        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![Arc::clone(engine), identity])
            .build()
            .dispatch()
            .await;

        Ok(())
    }

    fn parse_chat(chat: &ChatId) -> Result<TgChatId, TransportError> {
        let local = local_id_for(Platform::Telegram, chat)?;
        parse_chat_local(local)
    }
}

fn parse_chat_local(local: &str) -> Result<TgChatId, TransportError> {
    local
        .parse::<i64>()
        .map(TgChatId)
        .map_err(|_| TransportError::InvalidChat(local.to_owned()))
}

fn parse_message_id(message: &CanonicalMessage) -> Result<MessageId, TransportError> {
    message
        .message_id
        .parse::<i32>()
        .map(MessageId)
        .map_err(|_| TransportError::InvalidChat(format!("bad message id {}", message.message_id)))
}

async fn handle_message(
    msg: Message,
    engine: Arc<DispatchEngine>,
    identity: BotIdentity,
) -> ResponseResult<()> {
    debug!(chat = msg.chat.id.0, "telegram message received");
    engine.dispatch(canonicalize(&msg, &identity));
    Ok(())
}

/// Translate a Bot API message into the canonical model.
pub fn canonicalize(msg: &Message, identity: &BotIdentity) -> CanonicalMessage {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();
    let from = msg.from.as_ref();

    let mentioned_by_name = identity
        .username
        .as_ref()
        .is_some_and(|name| text.contains(&format!("@{name}")));
    let replied_to_bot = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .is_some_and(|user| user.id == identity.id);

    CanonicalMessage {
        platform: Platform::Telegram,
        chat_id: ChatId::new(Platform::Telegram, msg.chat.id.0.to_string()),
        message_id: msg.id.0.to_string(),
        sender_id: from.map(|u| u.id.0.to_string()).unwrap_or_default(),
        sender_name: from.map(|u| u.full_name()).unwrap_or_default(),
        text: text.to_owned(),
        is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
        is_self_authored: from.is_some_and(|u| u.id == identity.id),
        is_bot_mentioned: mentioned_by_name || replied_to_bot,
        media: media_ref(msg),
        received_at: msg.date,
    }
}

fn media_ref(msg: &Message) -> Option<MediaRef> {
    if let Some(voice) = msg.voice() {
        return Some(MediaRef {
            kind: MediaKind::Audio,
            mime_type: voice.mime_type.as_ref().map(ToString::to_string),
            locator: voice.file.id.clone(),
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(MediaRef {
            kind: MediaKind::Audio,
            mime_type: audio.mime_type.as_ref().map(ToString::to_string),
            locator: audio.file.id.clone(),
        });
    }
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        // Largest size comes last.
        return Some(MediaRef {
            kind: MediaKind::Image,
            mime_type: Some("image/jpeg".to_owned()),
            locator: photo.file.id.clone(),
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaRef {
            kind: MediaKind::Video,
            mime_type: video.mime_type.as_ref().map(ToString::to_string),
            locator: video.file.id.clone(),
        });
    }
    msg.document().map(|doc| {
        let mime = doc.mime_type.as_ref().map(ToString::to_string);
        MediaRef {
            kind: mime
                .as_deref()
                .map_or(MediaKind::Document, MediaKind::from_mime),
            mime_type: mime,
            locator: doc.file.id.clone(),
        }
    })
}

/// Reaction for a progress state. Bots may only use Telegram's fixed
/// reaction set, which excludes the hourglass and check mark.
pub fn reaction_emoji(progress: Progress) -> &'static str {
    match progress {
        Progress::Started => "\u{1F440}",
        Progress::Halfway => "\u{270D}",
        Progress::Done => "\u{1F44C}",
        Progress::Failed => "\u{1F44E}",
        Progress::Skipped => "\u{1F937}",
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn run(self: Arc<Self>, engine: Arc<DispatchEngine>) {
        reconnect_forever(Platform::Telegram, || self.session(&engine)).await;
    }

    async fn send_text(&self, chat: &ChatId, text: &str) -> Result<(), TransportError> {
        let chat = Self::parse_chat(chat)?;
        self.bot.send_message(chat, text).await?;
        Ok(())
    }

    async fn reply(&self, message: &CanonicalMessage, text: &str) -> Result<(), TransportError> {
        let chat = Self::parse_chat(&message.chat_id)?;
        let quoted = ReplyParameters::new(parse_message_id(message)?);
        self.bot
            .send_message(chat, text)
            .reply_parameters(quoted)
            .await?;
        Ok(())
    }

    async fn send_to_group(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        self.bot.send_message(parse_chat_local(local_id)?, text).await?;
        Ok(())
    }

    async fn send_to_individual(&self, local_id: &str, text: &str) -> Result<(), TransportError> {
        self.bot.send_message(parse_chat_local(local_id)?, text).await?;
        Ok(())
    }

    async fn mark_progress(
        &self,
        message: &CanonicalMessage,
        progress: Progress,
    ) -> Result<(), TransportError> {
        let chat = Self::parse_chat(&message.chat_id)?;
        let message_id = parse_message_id(message)?;
        let url = format!("{}/bot{}/setMessageReaction", self.api_base, self.token);
        let body = serde_json::json!({
            "chat_id": chat.0,
            "message_id": message_id.0,
            "reaction": [{ "type": "emoji", "emoji": reaction_emoji(progress) }],
        });
        // The URL carries the token; keep it out of errors that get logged.
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url()))?;
        check_response(resp).await?;
        Ok(())
    }

    async fn send_typing(&self, chat: &ChatId) -> Result<(), TransportError> {
        let chat = Self::parse_chat(chat)?;
        self.bot.send_chat_action(chat, ChatAction::Typing).await?;
        Ok(())
    }

    async fn send_image(
        &self,
        chat: &ChatId,
        image: Media,
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let chat = Self::parse_chat(chat)?;
        let name = image.file_name.unwrap_or_else(|| "image.png".to_owned());
        let mut request = self
            .bot
            .send_photo(chat, InputFile::memory(image.bytes).file_name(name));
        if let Some(caption) = caption {
            request = request.caption(caption);
        }
        request.await?;
        Ok(())
    }

    async fn send_audio(&self, chat: &ChatId, audio: Media) -> Result<(), TransportError> {
        let chat = Self::parse_chat(chat)?;
        let name = audio.file_name.unwrap_or_else(|| "audio.mp3".to_owned());
        self.bot
            .send_audio(chat, InputFile::memory(audio.bytes).file_name(name))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, message: &CanonicalMessage) -> Result<(), TransportError> {
        let chat = Self::parse_chat(&message.chat_id)?;
        let message_id = parse_message_id(message)?;
        self.bot.delete_message(chat, message_id).await?;
        Ok(())
    }

    async fn download_media(
        &self,
        message: &CanonicalMessage,
    ) -> Result<Option<Media>, TransportError> {
        let Some(media) = &message.media else {
            return Ok(None);
        };
        let file = self.bot.get_file(media.locator.clone()).await?;
        let mut bytes = Vec::new();
        self.bot.download_file(&file.path, &mut bytes).await?;
        debug!(size = bytes.len(), "telegram media downloaded");

        let mime = media
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_owned());
        let name = file.path.rsplit('/').next().unwrap_or(&file.path).to_owned();
        Ok(Some(Media::new(mime, bytes).with_file_name(name)))
    }
}

//! Canonical chat and message model shared by every transport and pipeline.
//!
//! Transports translate backend payloads into [`CanonicalMessage`] and address
//! chats exclusively through [`ChatId`], whose string form is
//! `"<platform>://<backend-local-id>"`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{self, ParsedCommand};

/// Separator between the platform tag and the backend-local id.
pub const CHAT_ID_SEPARATOR: &str = "://";

/// Messaging backends known to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Phone-bridge WhatsApp gateway.
    WhatsApp,
    /// Telegram Bot API.
    Telegram,
    /// Signal CLI REST bridge.
    Signal,
    /// Telegram client-library (user account) session.
    Telethon,
    /// Instagram direct messages.
    Instagram,
}

impl Platform {
    /// All platforms, in a stable order.
    pub const ALL: [Platform; 5] = [
        Platform::WhatsApp,
        Platform::Telegram,
        Platform::Signal,
        Platform::Telethon,
        Platform::Instagram,
    ];

    /// Tag used as the chat id prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::WhatsApp => "whatsapp",
            Platform::Telegram => "telegram",
            Platform::Signal => "signal",
            Platform::Telethon => "telethon",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ChatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ChatIdError::UnknownPlatform(s.to_owned()))
    }
}

/// Errors from parsing a canonical chat id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatIdError {
    /// The string has no `://` separator.
    #[error("chat id `{0}` is missing the `<platform>://` prefix")]
    MissingPrefix(String),
    /// The prefix does not name a known platform.
    #[error("unknown platform `{0}`")]
    UnknownPlatform(String),
    /// Nothing follows the prefix.
    #[error("chat id `{0}` has an empty backend id")]
    EmptyLocalId(String),
}

/// Globally unique, stable chat identifier: `"<platform>://<backend-local-id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatId(String);

impl ChatId {
    /// Build a chat id from a platform and its backend-local id.
    pub fn new(platform: Platform, local_id: impl AsRef<str>) -> Self {
        Self(format!(
            "{}{CHAT_ID_SEPARATOR}{}",
            platform.as_str(),
            local_id.as_ref()
        ))
    }

    /// Platform tag: the part before `://`.
    pub fn platform_tag(&self) -> &str {
        self.0
            .split_once(CHAT_ID_SEPARATOR)
            .map_or("", |(tag, _)| tag)
    }

    /// Platform, if the tag names a known one.
    pub fn platform(&self) -> Option<Platform> {
        self.platform_tag().parse().ok()
    }

    /// Backend-native id with the `<platform>://` prefix stripped.
    pub fn local_id(&self) -> &str {
        self.0
            .split_once(CHAT_ID_SEPARATOR)
            .map_or(self.0.as_str(), |(_, local)| local)
    }

    /// The full canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChatId {
    type Err = ChatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, local) = s
            .split_once(CHAT_ID_SEPARATOR)
            .ok_or_else(|| ChatIdError::MissingPrefix(s.to_owned()))?;
        let platform: Platform = tag.parse()?;
        if local.is_empty() {
            return Err(ChatIdError::EmptyLocalId(s.to_owned()));
        }
        Ok(Self::new(platform, local))
    }
}

impl TryFrom<String> for ChatId {
    type Error = ChatIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChatId> for String {
    fn from(value: ChatId) -> Self {
        value.0
    }
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Voice note or audio file.
    Audio,
    /// Photo or sticker image.
    Image,
    /// Video clip.
    Video,
    /// Any other attachment.
    Document,
}

impl MediaKind {
    /// Classify a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or_default() {
            "audio" => MediaKind::Audio,
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            _ => MediaKind::Document,
        }
    }
}

/// Reference to media that the owning transport can download on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// What kind of media this is.
    pub kind: MediaKind,
    /// MIME type, when the backend reports one up front.
    pub mime_type: Option<String>,
    /// Backend-specific locator (file id, attachment id, message id).
    pub locator: String,
}

/// Downloaded media content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// MIME type of `bytes`.
    pub mime_type: String,
    /// Raw content.
    pub bytes: Vec<u8>,
    /// Suggested file name, if any.
    pub file_name: Option<String>,
}

impl Media {
    /// Build media from a MIME type and raw bytes.
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
            file_name: None,
        }
    }

    /// Attach a file name.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Normalized view of an inbound message, produced by every transport.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    /// Backend that received the message.
    pub platform: Platform,
    /// Canonical chat the message belongs to.
    pub chat_id: ChatId,
    /// Backend-local message handle, opaque outside the owning transport.
    pub message_id: String,
    /// Backend-local sender id.
    pub sender_id: String,
    /// Human-readable sender name.
    pub sender_name: String,
    /// Message text or caption, possibly empty.
    pub text: String,
    /// Whether the chat is a group chat.
    pub is_group: bool,
    /// Whether the bot's own account sent the message.
    pub is_self_authored: bool,
    /// Whether the bot account is mentioned in the message.
    pub is_bot_mentioned: bool,
    /// Attached media, fetched lazily through the transport.
    pub media: Option<MediaRef>,
    /// When the message was received (or sent, if the backend reports it).
    pub received_at: DateTime<Utc>,
}

impl CanonicalMessage {
    /// Start a text message in the given chat. Remaining fields use defaults.
    pub fn new(chat_id: ChatId, message_id: impl Into<String>, text: impl Into<String>) -> Self {
        let platform = chat_id.platform().unwrap_or(Platform::WhatsApp);
        Self {
            platform,
            chat_id,
            message_id: message_id.into(),
            sender_id: String::new(),
            sender_name: String::new(),
            text: text.into(),
            is_group: false,
            is_self_authored: false,
            is_bot_mentioned: false,
            media: None,
            received_at: Utc::now(),
        }
    }

    /// Whether an audio attachment is present.
    pub fn has_audio(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|m| m.kind == MediaKind::Audio)
    }

    /// Whether an image attachment is present.
    pub fn has_image(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|m| m.kind == MediaKind::Image)
    }

    /// Command name at the start of the text, if any.
    pub fn command(&self) -> Option<&str> {
        command::extract_command(&self.text)
    }

    /// Whether the text starts with the named command (ASCII case-insensitive).
    pub fn is_command(&self, name: &str) -> bool {
        command::is_command(&self.text, name)
    }

    /// Full command parse of the text, if any.
    pub fn parsed_command(&self) -> Option<ParsedCommand<'_>> {
        command::extract_command_full(&self.text)
    }
}

//! Per-chat image gallery: `#gallery(on|off)` toggles collection, and while
//! on, every image posted in the chat is stored once.

use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;
use crate::storage::{GalleryStore, InsertOutcome};

/// Gallery collection pipeline.
pub struct GalleryPipeline {
    access: ChatAccess,
    gallery: GalleryStore,
}

impl GalleryPipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, gallery: GalleryStore) -> Self {
        Self { access, gallery }
    }

    async fn toggle(&self, ctx: &PipelineContext, setting: &str) -> Result<Outcome, PipelineError> {
        let chat = &ctx.message().chat_id;
        match setting.trim().to_ascii_lowercase().as_str() {
            "on" => {
                self.gallery.set_enabled(chat, true).await?;
                ctx.reply("Gallery enabled: images in this chat will be collected.")
                    .await?;
            }
            "off" => {
                self.gallery.set_enabled(chat, false).await?;
                ctx.reply("Gallery disabled.").await?;
            }
            _ => {
                let state = if self.gallery.is_enabled(chat).await? {
                    "on"
                } else {
                    "off"
                };
                let count = self.gallery.count(chat).await?;
                ctx.reply(&format!("Gallery is {state}, {count} images stored."))
                    .await?;
            }
        }
        Ok(Outcome::Done)
    }

    async fn collect(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let message = ctx.message();
        if !self.gallery.is_enabled(&message.chat_id).await? {
            return Ok(Outcome::Silent);
        }
        let Some(image) = ctx.transport().download_media(message).await? else {
            return Ok(Outcome::Skipped("image could not be downloaded".to_owned()));
        };
        match self
            .gallery
            .insert_image(&message.chat_id, &image.mime_type, &image.bytes)
            .await?
        {
            InsertOutcome::Inserted => {
                debug!(chat = %message.chat_id, size = image.bytes.len(), "image stored");
                Ok(Outcome::Done)
            }
            InsertOutcome::Duplicate => Ok(Outcome::Skipped("image already in gallery".to_owned())),
        }
    }
}

#[async_trait]
impl Pipeline for GalleryPipeline {
    fn name(&self) -> &str {
        "gallery"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("gallery") || message.has_image()
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        match ctx.message().parsed_command() {
            Some(command) if command.command.eq_ignore_ascii_case("gallery") => {
                let setting = command.params.to_owned();
                self.toggle(ctx, &setting).await
            }
            _ => self.collect(ctx).await,
        }
    }

    fn help_text(&self) -> Option<String> {
        Some("#gallery(on|off): collect images posted in this chat".to_owned())
    }
}

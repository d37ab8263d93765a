//! `#imagine <prompt>`: generate images.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::{CanonicalMessage, Media};
use crate::services::ImageGenerator;
use crate::transport::Progress;

/// Image generation pipeline.
pub struct ImaginePipeline {
    access: ChatAccess,
    generator: Arc<dyn ImageGenerator>,
}

impl ImaginePipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, generator: Arc<dyn ImageGenerator>) -> Self {
        Self { access, generator }
    }
}

#[async_trait]
impl Pipeline for ImaginePipeline {
    fn name(&self) -> &str {
        "imagine"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("imagine")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let prompt = ctx
            .message()
            .parsed_command()
            .map(|c| c.remainder.to_owned())
            .unwrap_or_default();
        if prompt.is_empty() {
            return Ok(Outcome::Skipped("no prompt given".to_owned()));
        }

        ctx.progress_best_effort(Progress::Started).await;
        let images = self.generator.generate(&prompt).await?;
        ctx.progress_best_effort(Progress::Halfway).await;

        let chat = &ctx.message().chat_id;
        for image in images {
            let media = Media::new("image/png", image.bytes).with_file_name(image.file_name);
            ctx.transport()
                .send_image(chat, media, Some(prompt.as_str()))
                .await?;
        }
        Ok(Outcome::Done)
    }

    fn help_text(&self) -> Option<String> {
        Some("#imagine <prompt>: generate an image".to_owned())
    }
}

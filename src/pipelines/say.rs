//! `#say(<lang>) <text>`: text-to-speech.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::{CanonicalMessage, Media};
use crate::services::Synthesizer;
use crate::transport::Progress;

/// Speech synthesis pipeline.
pub struct SayPipeline {
    access: ChatAccess,
    synthesizer: Arc<dyn Synthesizer>,
    default_language: String,
}

impl SayPipeline {
    /// Create the pipeline; `default_language` applies when the command has
    /// no parameter list.
    pub fn new(
        access: ChatAccess,
        synthesizer: Arc<dyn Synthesizer>,
        default_language: String,
    ) -> Self {
        Self {
            access,
            synthesizer,
            default_language,
        }
    }

    /// Language and text for a `#say` message, or `None` if there is no text.
    pub fn request<'a>(&'a self, message: &'a CanonicalMessage) -> Option<(&'a str, &'a str)> {
        let command = message.parsed_command()?;
        if command.remainder.is_empty() {
            return None;
        }
        let language = match command.params.trim() {
            "" => self.default_language.as_str(),
            language => language,
        };
        Some((language, command.remainder))
    }
}

#[async_trait]
impl Pipeline for SayPipeline {
    fn name(&self) -> &str {
        "say"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("say")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let Some((language, text)) = self.request(ctx.message()) else {
            return Ok(Outcome::Skipped("nothing to say".to_owned()));
        };

        ctx.progress_best_effort(Progress::Started).await;
        let audio = self.synthesizer.synthesize(text, language).await?;
        let media = Media::new("audio/mpeg", audio).with_file_name("speech.mp3");
        ctx.transport()
            .send_audio(&ctx.message().chat_id, media)
            .await?;
        Ok(Outcome::Done)
    }

    fn help_text(&self) -> Option<String> {
        Some(format!(
            "#say(<language>) <text>: read text aloud (default language {})",
            self.default_language
        ))
    }
}

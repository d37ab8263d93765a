//! Voice message transcription.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;
use crate::services::{Transcriber, Transcript};
use crate::transport::Progress;

/// Transcribes audio messages, or any message carrying `#transcribe`.
pub struct TranscribePipeline {
    access: ChatAccess,
    transcriber: Arc<dyn Transcriber>,
}

impl TranscribePipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            access,
            transcriber,
        }
    }
}

/// Reply text for a transcript.
pub fn format_transcript(transcript: &Transcript) -> String {
    match &transcript.language {
        Some(language) => format!(
            "\u{1F5E3} ({language}, {} words): {}",
            transcript.word_count, transcript.text
        ),
        None => format!("\u{1F5E3} {}", transcript.text),
    }
}

#[async_trait]
impl Pipeline for TranscribePipeline {
    fn name(&self) -> &str {
        "transcribe"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.has_audio() || message.is_command("transcribe")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let message = ctx.message();
        if !message.has_audio() {
            return Ok(Outcome::Skipped("message has no audio".to_owned()));
        }

        ctx.progress_best_effort(Progress::Started).await;
        let Some(audio) = ctx.transport().download_media(message).await? else {
            return Ok(Outcome::Skipped("audio could not be downloaded".to_owned()));
        };

        ctx.progress_best_effort(Progress::Halfway).await;
        let transcript = self.transcriber.transcribe(&audio).await?;
        if transcript.text.is_empty() {
            return Ok(Outcome::Skipped("no speech recognized".to_owned()));
        }

        ctx.reply(&format_transcript(&transcript)).await?;
        Ok(Outcome::Done)
    }

    fn help_text(&self) -> Option<String> {
        Some("voice messages are transcribed automatically".to_owned())
    }
}

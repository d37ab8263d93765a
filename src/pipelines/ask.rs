//! `#ask <question>`: answer through the configured answerer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;
use crate::services::{Answer, Answerer};
use crate::transport::Progress;

/// Question answering pipeline.
pub struct AskPipeline {
    access: ChatAccess,
    answerer: Arc<dyn Answerer>,
}

impl AskPipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, answerer: Arc<dyn Answerer>) -> Self {
        Self { access, answerer }
    }
}

/// Reply text for an answer; the cost line is shown only when non-zero.
pub fn format_answer(answer: &Answer) -> String {
    if answer.cost > 0.0 {
        format!("{}\n\n(cost: ${:.4})", answer.text, answer.cost)
    } else {
        answer.text.clone()
    }
}

#[async_trait]
impl Pipeline for AskPipeline {
    fn name(&self) -> &str {
        "ask"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("ask")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let prompt = ctx
            .message()
            .parsed_command()
            .map(|c| c.remainder.to_owned())
            .unwrap_or_default();
        if prompt.is_empty() {
            return Ok(Outcome::Skipped("no question given".to_owned()));
        }

        ctx.progress_best_effort(Progress::Started).await;
        if let Err(e) = ctx.transport().send_typing(&ctx.message().chat_id).await {
            debug!(error = %e, "typing indicator failed");
        }

        let answer = self.answerer.answer(&prompt).await?;
        ctx.reply(&format_answer(&answer)).await?;
        Ok(Outcome::Done)
    }

    fn help_text(&self) -> Option<String> {
        Some("#ask <question>: answer a question".to_owned())
    }
}

//! `#help`: list what the bot can do in this chat.

use async_trait::async_trait;

use crate::dispatch::{ChatAccess, HelpEntry, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;

/// Replies with the help text of every pipeline allowed in the chat.
pub struct HelpPipeline {
    access: ChatAccess,
}

impl HelpPipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess) -> Self {
        Self { access }
    }
}

/// Render help entries as a reply.
pub fn render_help(entries: &[HelpEntry]) -> String {
    if entries.is_empty() {
        return "No commands are available in this chat.".to_owned();
    }
    let mut text = String::from("Available commands:");
    for entry in entries {
        text.push_str("\n- ");
        text.push_str(&entry.text);
    }
    text
}

#[async_trait]
impl Pipeline for HelpPipeline {
    fn name(&self) -> &str {
        "help"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("help")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        ctx.reply(&render_help(&ctx.help_entries())).await?;
        Ok(Outcome::Done)
    }

    fn help_text(&self) -> Option<String> {
        Some("#help: show this list".to_owned())
    }
}

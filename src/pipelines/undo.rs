//! Self-authored `#undo`: delete the bot account's previous message along
//! with the command itself.

use async_trait::async_trait;
use tracing::info;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;
use crate::storage::HistoryStore;

/// Retracts the last message sent from the bot's own account.
pub struct UndoPipeline {
    access: ChatAccess,
    history: HistoryStore,
}

impl UndoPipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, history: HistoryStore) -> Self {
        Self { access, history }
    }
}

#[async_trait]
impl Pipeline for UndoPipeline {
    fn name(&self) -> &str {
        "undo"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_self_authored && message.is_command("undo")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let message = ctx.message();
        let Some(previous) = self
            .history
            .last_self_authored(&message.chat_id, &message.message_id)
            .await?
        else {
            return Ok(Outcome::Skipped("nothing to undo".to_owned()));
        };

        let mut target = CanonicalMessage::new(
            previous.chat_id.clone(),
            previous.message_id.clone(),
            previous.text.clone(),
        );
        target.is_self_authored = true;
        target.sender_id = message.sender_id.clone();
        target.sender_name = previous.sender_name.clone();

        ctx.transport().delete_message(&target).await?;
        ctx.transport().delete_message(message).await?;
        self.history
            .remove(&previous.chat_id, &previous.message_id)
            .await?;
        info!(chat = %message.chat_id, message_id = %previous.message_id, "undid message");
        // The command message is gone, so there is nothing left to mark.
        Ok(Outcome::Silent)
    }
}

//! Records every message into the per-chat history.

use async_trait::async_trait;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::CanonicalMessage;
use crate::storage::{HistoryRecord, HistoryStore};

/// Bookkeeping pipeline: stores each message and leaves no marker.
pub struct HistoryPipeline {
    access: ChatAccess,
    history: HistoryStore,
}

impl HistoryPipeline {
    /// Create the pipeline over a history store.
    pub fn new(access: ChatAccess, history: HistoryStore) -> Self {
        Self { access, history }
    }
}

#[async_trait]
impl Pipeline for HistoryPipeline {
    fn name(&self) -> &str {
        "history"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, _message: &CanonicalMessage) -> bool {
        true
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        self.history
            .append(&HistoryRecord::from_message(ctx.message()))
            .await?;
        Ok(Outcome::Silent)
    }
}

//! The pipeline contract: access filter, match predicate and side effect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::message::{CanonicalMessage, ChatId};
use crate::services::ServiceError;
use crate::storage::StorageError;
use crate::transport::{Progress, Transport, TransportError, TransportRegistry};

use super::access::ChatAccess;
use super::{DispatchEngine, HelpEntry};

/// Successful result of [`Pipeline::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Work finished; the engine marks the message done.
    Done,
    /// Work finished without a visible marker (bookkeeping pipelines).
    Silent,
    /// The pipeline recognized the message but declined to act.
    Skipped(String),
}

/// Recoverable pipeline failure, reported to the chat by the engine.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A collaborator service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Talking to the transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Persisted state could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure with a reason meant for the user.
    #[error("{0}")]
    Failed(String),

    /// The pipeline task panicked.
    #[error("pipeline panicked: {0}")]
    Panicked(String),

    /// The pipeline exceeded the configured time limit.
    #[error("pipeline timed out after {0:?}")]
    TimedOut(Duration),
}

impl PipelineError {
    /// Short explanation sent back to the chat.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Failed(reason) => reason.clone(),
            PipelineError::Service(e) => format!("Service error: {e}"),
            PipelineError::TimedOut(_) => "That took too long, giving up.".to_owned(),
            PipelineError::Transport(_)
            | PipelineError::Storage(_)
            | PipelineError::Panicked(_) => "Something went wrong.".to_owned(),
        }
    }
}

/// A pluggable message handler.
///
/// Constructed once at startup and registered into the [`DispatchEngine`].
/// Any state kept across invocations must be internally synchronized:
/// `process` runs concurrently for different messages.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Short identifier used in logs and the help listing.
    fn name(&self) -> &str;

    /// Chat access rules.
    fn access(&self) -> &ChatAccess;

    /// Whether this pipeline may run in the message's chat.
    fn allowed_in_chat(&self, message: &CanonicalMessage) -> bool {
        self.access().allows(&message.chat_id)
    }

    /// Whether this pipeline wants to handle the message.
    fn matches(&self, message: &CanonicalMessage) -> bool;

    /// Perform the side effect.
    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError>;

    /// One-line description for the generated help listing.
    fn help_text(&self) -> Option<String> {
        None
    }
}

/// Everything a pipeline needs while processing one message.
#[derive(Clone)]
pub struct PipelineContext {
    message: Arc<CanonicalMessage>,
    transport: Arc<dyn Transport>,
    engine: Arc<DispatchEngine>,
}

impl PipelineContext {
    /// Bundle a message with its owning transport.
    pub fn new(
        message: Arc<CanonicalMessage>,
        transport: Arc<dyn Transport>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            message,
            transport,
            engine,
        }
    }

    /// The message being processed.
    pub fn message(&self) -> &CanonicalMessage {
        &self.message
    }

    /// Transport that received the message.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// All registered transports.
    pub fn registry(&self) -> &TransportRegistry {
        self.engine.registry()
    }

    /// Reply to the message.
    pub async fn reply(&self, text: &str) -> Result<(), TransportError> {
        self.transport.reply(&self.message, text).await
    }

    /// Attach a progress indicator to the message.
    pub async fn progress(&self, progress: Progress) -> Result<(), TransportError> {
        self.transport.mark_progress(&self.message, progress).await
    }

    /// Progress update whose failure is logged rather than returned.
    pub async fn progress_best_effort(&self, progress: Progress) {
        if let Err(e) = self.progress(progress).await {
            warn!(chat = %self.message.chat_id, ?progress, error = %e, "failed to mark progress");
        }
    }

    /// Send text to any known chat, whichever transport owns it.
    ///
    /// Returns `Ok(false)` if no registered transport owns the chat.
    pub async fn send_to(&self, chat: &ChatId, text: &str) -> Result<bool, TransportError> {
        match self.registry().resolve(chat) {
            Some(transport) => {
                transport.send_text(chat, text).await?;
                Ok(true)
            }
            None => {
                warn!(%chat, "no transport registered for chat");
                Ok(false)
            }
        }
    }

    /// Help entries of external pipelines allowed in this chat.
    pub fn help_entries(&self) -> Vec<HelpEntry> {
        self.engine.help_listing(&self.message.chat_id)
    }
}

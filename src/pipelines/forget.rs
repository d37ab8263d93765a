//! `#forget`: wipe a chat's history after a second confirming `#forget`.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use crate::dispatch::{ChatAccess, Outcome, Pipeline, PipelineContext, PipelineError};
use crate::message::{CanonicalMessage, ChatId};
use crate::storage::HistoryStore;

/// How long a first `#forget` waits for its confirmation.
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(60);

/// Result of registering a request with [`PendingConfirmations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// First request: now waiting for a second one.
    Armed,
    /// A pending request was confirmed within the window.
    Confirmed,
}

/// Per-chat pending confirmations, shared by concurrent pipeline runs.
#[derive(Debug)]
pub struct PendingConfirmations {
    window: Duration,
    pending: Mutex<HashMap<ChatId, Instant>>,
}

impl PendingConfirmations {
    /// Confirmations that expire after `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request for `chat` at time `now`.
    ///
    /// A second request within the window confirms and clears the pending
    /// entry; otherwise the request arms a new one.
    pub fn request(&self, chat: &ChatId, now: Instant) -> Confirmation {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let window = self.window;
        pending.retain(|_, armed_at| now.saturating_duration_since(*armed_at) <= window);

        if pending.remove(chat).is_some() {
            Confirmation::Confirmed
        } else {
            pending.insert(chat.clone(), now);
            Confirmation::Armed
        }
    }

    /// Number of chats awaiting confirmation.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is awaiting confirmation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// History wipe with confirmation.
pub struct ForgetPipeline {
    access: ChatAccess,
    history: HistoryStore,
    pending: PendingConfirmations,
}

impl ForgetPipeline {
    /// Create the pipeline.
    pub fn new(access: ChatAccess, history: HistoryStore) -> Self {
        Self {
            access,
            history,
            pending: PendingConfirmations::new(CONFIRM_WINDOW),
        }
    }
}

#[async_trait]
impl Pipeline for ForgetPipeline {
    fn name(&self) -> &str {
        "forget"
    }

    fn access(&self) -> &ChatAccess {
        &self.access
    }

    fn matches(&self, message: &CanonicalMessage) -> bool {
        message.is_command("forget")
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<Outcome, PipelineError> {
        let chat = &ctx.message().chat_id;
        match self.pending.request(chat, Instant::now()) {
            Confirmation::Armed => {
                ctx.reply(&format!(
                    "This deletes the stored history of this chat. Send #forget again within {} seconds to confirm.",
                    CONFIRM_WINDOW.as_secs()
                ))
                .await?;
                Ok(Outcome::Done)
            }
            Confirmation::Confirmed => {
                let removed = self.history.clear(chat).await?;
                info!(%chat, removed, "chat history cleared");
                ctx.reply(&format!("Forgot {removed} stored messages.")).await?;
                Ok(Outcome::Done)
            }
        }
    }

    fn help_text(&self) -> Option<String> {
        Some("#forget: delete this chat's stored history (asks to confirm)".to_owned())
    }
}

//! Telegram client-library (user account) adapter.
//!
//! There is no MTProto client in the dependency stack, so this adapter keeps
//! the full capability set with no-op outbound calls and a receive loop that
//! logs and returns. Chats it owns stay addressable and routable.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::dispatch::DispatchEngine;
use crate::message::{ChatId, Platform};

use super::{local_id_for, Transport, TransportError};

/// User-account Telegram transport without a live backend.
#[derive(Debug, Default)]
pub struct TelethonTransport {
    session: Option<String>,
}

impl TelethonTransport {
    /// Create a transport from its config section.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            session: config.session.clone(),
        }
    }
}

#[async_trait]
impl Transport for TelethonTransport {
    fn platform(&self) -> Platform {
        Platform::Telethon
    }

    async fn run(self: Arc<Self>, _engine: Arc<DispatchEngine>) {
        warn!(
            session = self.session.as_deref().unwrap_or("-"),
            "telethon transport has no backend, receive loop not started"
        );
    }

    async fn send_text(&self, chat: &ChatId, _text: &str) -> Result<(), TransportError> {
        let peer = local_id_for(Platform::Telethon, chat)?;
        debug!(peer, "telethon send dropped");
        Ok(())
    }
}

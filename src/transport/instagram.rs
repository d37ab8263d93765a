//! Instagram direct-message adapter.
//!
//! Registered so Instagram chat ids resolve, but without a backend client:
//! outbound calls are accepted and dropped and the receive loop returns
//! immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::dispatch::DispatchEngine;
use crate::message::{ChatId, Platform};

use super::{local_id_for, Transport, TransportError};

/// Instagram transport without a live backend.
#[derive(Debug, Default)]
pub struct InstagramTransport {
    account: Option<String>,
}

impl InstagramTransport {
    /// Create a transport from its config section.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            account: config.session.clone(),
        }
    }
}

#[async_trait]
impl Transport for InstagramTransport {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn run(self: Arc<Self>, _engine: Arc<DispatchEngine>) {
        warn!(
            account = self.account.as_deref().unwrap_or("-"),
            "instagram transport has no backend, receive loop not started"
        );
    }

    async fn send_text(&self, chat: &ChatId, _text: &str) -> Result<(), TransportError> {
        let thread = local_id_for(Platform::Instagram, chat)?;
        debug!(thread, "instagram send dropped");
        Ok(())
    }
}

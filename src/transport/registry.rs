//! Platform-keyed registry of transport adapters.
//!
//! Populated once at startup, then shared read-only as
//! `Arc<TransportRegistry>`: no locking on the lookup path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{ConfigError, TransportsConfig};
use crate::credentials::Credentials;
use crate::dispatch::DispatchEngine;
use crate::message::{ChatId, Platform, CHAT_ID_SEPARATOR};

use super::instagram::InstagramTransport;
use super::signal::SignalTransport;
use super::telegram::TelegramTransport;
use super::telethon::TelethonTransport;
use super::whatsapp::WhatsAppTransport;
use super::Transport;

/// One adapter per platform, resolvable from any canonical chat id.
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<Platform, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one adapter per configured `[transports.*]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if a transport's secret is
    /// not available, or [`ConfigError::InvalidUrl`] for a bad Telegram
    /// `api_url`.
    pub fn from_config(
        config: &TransportsConfig,
        credentials: &Credentials,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        if let Some(whatsapp) = &config.whatsapp {
            registry.register(Arc::new(WhatsAppTransport::new(whatsapp)))?;
        }
        if let Some(telegram) = &config.telegram {
            let token = credentials.require(&telegram.bot_token_env)?;
            registry.register(Arc::new(TelegramTransport::from_config(telegram, token)?))?;
        }
        if let Some(signal) = &config.signal {
            registry.register(Arc::new(SignalTransport::new(signal)))?;
        }
        if let Some(telethon) = &config.telethon {
            registry.register(Arc::new(TelethonTransport::new(telethon)))?;
        }
        if let Some(instagram) = &config.instagram {
            registry.register(Arc::new(InstagramTransport::new(instagram)))?;
        }
        info!(platforms = ?registry.platforms(), "transports configured");
        Ok(registry)
    }

    /// Register an adapter under its platform.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTransport`] if the platform already has one.
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> Result<(), ConfigError> {
        let platform = transport.platform();
        if self.transports.contains_key(&platform) {
            return Err(ConfigError::DuplicateTransport(platform));
        }
        self.transports.insert(platform, transport);
        Ok(())
    }

    /// Adapter owning the given chat.
    pub fn resolve(&self, chat: &ChatId) -> Option<Arc<dyn Transport>> {
        let platform = chat.platform()?;
        self.transports.get(&platform).cloned()
    }

    /// Adapter owning a chat given as a raw canonical string.
    pub fn resolve_str(&self, chat: &str) -> Option<Arc<dyn Transport>> {
        let (tag, _) = chat.split_once(CHAT_ID_SEPARATOR)?;
        let platform: Platform = tag.parse().ok()?;
        self.transports.get(&platform).cloned()
    }

    /// Adapter for a platform.
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Transport>> {
        self.transports.get(&platform).cloned()
    }

    /// Registered platforms.
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.transports.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Whether no adapters are registered.
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Spawn one receive loop per registered adapter.
    ///
    /// Call only after registration is complete.
    pub fn spawn_receive_loops(&self, engine: &Arc<DispatchEngine>) -> Vec<JoinHandle<()>> {
        self.transports
            .values()
            .map(|transport| {
                info!(platform = %transport.platform(), "starting receive loop");
                let transport = Arc::clone(transport);
                let engine = Arc::clone(engine);
                tokio::spawn(async move { transport.run(engine).await })
            })
            .collect()
    }
}

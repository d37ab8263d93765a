//! relaybot: a multi-transport chat relay.
//!
//! Messages from WhatsApp, Telegram, Signal and friends are normalized into
//! one [`message::CanonicalMessage`] shape and routed by the
//! [`dispatch::DispatchEngine`] to every matching pipeline, each running in
//! its own task. Pipelines talk back through the [`transport::Transport`]
//! that owns the chat, never through a platform API directly.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod message;
pub mod storage;

pub mod dispatch;
pub mod transport;

pub mod pipelines;
pub mod services;

pub mod notifier;

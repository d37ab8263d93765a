//! Cron-scheduled notifications.
//!
//! Each `[[notifications]]` entry sends a fixed text to a canonical chat id
//! whenever its cron expression fires. The loop ticks every
//! [`TICK_INTERVAL`] and sends through the transport registry.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::transport::TransportRegistry;

/// How often due notifications are evaluated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Last-run bookkeeping for notifications.
#[derive(Debug)]
pub struct NotifierState {
    started_at: DateTime<Utc>,
    last_run: HashMap<String, DateTime<Utc>>,
}

impl NotifierState {
    /// State for a notifier started at `started_at`.
    ///
    /// Notifications that never ran are evaluated from this instant, so a
    /// restart does not replay triggers from the past.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_run: HashMap::new(),
        }
    }

    /// Record that a notification was sent at the given time.
    pub fn record_run(&mut self, name: &str, at: DateTime<Utc>) {
        self.last_run.insert(name.to_owned(), at);
    }

    /// Last send time, or the start time for notifications never sent.
    pub fn last_run_for(&self, name: &str) -> DateTime<Utc> {
        self.last_run.get(name).copied().unwrap_or(self.started_at)
    }
}

/// Notifications with a cron trigger between their last run and `now`.
pub fn due_notifications<'a>(
    notifications: &'a [NotificationConfig],
    state: &NotifierState,
    now: DateTime<Utc>,
) -> Vec<&'a NotificationConfig> {
    notifications
        .iter()
        .filter(|notification| {
            if !notification.enabled {
                return false;
            }
            let schedule = match cron::Schedule::from_str(&notification.cron) {
                Ok(s) => s,
                Err(e) => {
                    warn!(
                        notification = %notification.name,
                        cron = %notification.cron,
                        error = %e,
                        "invalid cron expression, skipping notification"
                    );
                    return false;
                }
            };
            let after = state.last_run_for(&notification.name);
            schedule.after(&after).take(1).any(|next| next <= now)
        })
        .collect()
}

/// Send one notification. Returns whether a transport accepted it.
pub async fn send_notification(
    registry: &TransportRegistry,
    notification: &NotificationConfig,
) -> bool {
    let Some(transport) = registry.resolve(&notification.chat) else {
        warn!(
            notification = %notification.name,
            chat = %notification.chat,
            "no transport registered for notification chat, skipping"
        );
        return false;
    };
    match transport
        .send_text(&notification.chat, &notification.text)
        .await
    {
        Ok(()) => {
            info!(notification = %notification.name, chat = %notification.chat, "notification sent");
            true
        }
        Err(e) => {
            warn!(notification = %notification.name, error = %e, "failed to send notification");
            false
        }
    }
}

/// Evaluate and send everything due at `now`.
///
/// A notification counts as run even when sending failed, so a broken chat
/// is retried at its next trigger rather than every tick.
pub async fn run_tick(
    registry: &TransportRegistry,
    notifications: &[NotificationConfig],
    state: &mut NotifierState,
    now: DateTime<Utc>,
) -> usize {
    let due = due_notifications(notifications, state, now);
    let count = due.len();
    for notification in due {
        send_notification(registry, notification).await;
        state.record_run(&notification.name, now);
    }
    count
}

/// Run the notifier loop until `shutdown_rx` flips to `true` or closes.
pub async fn run_notifier(
    registry: Arc<TransportRegistry>,
    notifications: Vec<NotificationConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if notifications.is_empty() {
        debug!("no notifications configured");
        return;
    }
    info!(count = notifications.len(), "notifier started");

    let mut interval = tokio::time::interval(TICK_INTERVAL);
    let mut state = NotifierState::new(Utc::now());
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&registry, &notifications, &mut state, Utc::now()).await;
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("notifier shutting down");
                    break;
                }
            }
        }
    }
}

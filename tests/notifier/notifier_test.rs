//! Tests for scheduled notification delivery.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use relaybot::config::NotificationConfig;
use relaybot::message::{ChatId, Platform};
use relaybot::notifier::{run_tick, send_notification, NotifierState};

use crate::support::{registry_with, telegram_chat, Call, RecordingTransport};

fn notification(name: &str, chat: ChatId) -> NotificationConfig {
    NotificationConfig {
        name: name.to_owned(),
        cron: "0 0 9 * * *".to_owned(),
        chat,
        text: format!("{name} reminder"),
        enabled: true,
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0)
        .single()
        .expect("valid time")
}

#[tokio::test]
async fn due_notification_is_sent_once_per_trigger() {
    let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
    let registry = registry_with(Arc::clone(&transport));
    let notifications = vec![notification("standup", telegram_chat("-100"))];
    let mut state = NotifierState::new(at(1, 8));

    assert_eq!(run_tick(&registry, &notifications, &mut state, at(1, 8)).await, 0);
    assert_eq!(run_tick(&registry, &notifications, &mut state, at(1, 9)).await, 1);
    assert_eq!(run_tick(&registry, &notifications, &mut state, at(1, 10)).await, 0);
    assert_eq!(run_tick(&registry, &notifications, &mut state, at(2, 9)).await, 1);

    let expected = Call::Text {
        chat: telegram_chat("-100"),
        text: "standup reminder".to_owned(),
    };
    assert_eq!(transport.calls(), vec![expected.clone(), expected]);
}

#[tokio::test]
async fn unregistered_platform_is_skipped() {
    let transport = Arc::new(RecordingTransport::new(Platform::Telegram));
    let registry = registry_with(Arc::clone(&transport));
    let target = notification("elsewhere", ChatId::new(Platform::Signal, "+4912345"));

    assert!(!send_notification(&registry, &target).await);
    assert!(transport.calls().is_empty());
}

//! Tests for `src/storage/gallery.rs`.

use relaybot::message::{ChatId, Platform};
use relaybot::storage::{InsertOutcome, Store};

fn chat(id: &str) -> ChatId {
    ChatId::new(Platform::Telegram, id)
}

#[tokio::test]
async fn gallery_is_off_until_enabled() {
    let store = Store::in_memory().await.expect("store");
    let gallery = store.gallery();
    let chat = chat("1");

    assert!(!gallery.is_enabled(&chat).await.expect("query"));
    gallery.set_enabled(&chat, true).await.expect("enable");
    assert!(gallery.is_enabled(&chat).await.expect("query"));
    gallery.set_enabled(&chat, false).await.expect("disable");
    assert!(!gallery.is_enabled(&chat).await.expect("query"));
}

#[tokio::test]
async fn identical_bytes_are_stored_once_per_chat() {
    let store = Store::in_memory().await.expect("store");
    let gallery = store.gallery();

    let first = gallery
        .insert_image(&chat("1"), "image/png", b"pixels")
        .await
        .expect("insert");
    let again = gallery
        .insert_image(&chat("1"), "image/png", b"pixels")
        .await
        .expect("insert");
    let elsewhere = gallery
        .insert_image(&chat("2"), "image/png", b"pixels")
        .await
        .expect("insert");

    assert_eq!(first, InsertOutcome::Inserted);
    assert_eq!(again, InsertOutcome::Duplicate);
    assert_eq!(elsewhere, InsertOutcome::Inserted);
    assert_eq!(gallery.count(&chat("1")).await.expect("count"), 1);
}

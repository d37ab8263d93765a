//! Built-in pipelines driven through the dispatch engine.

use std::sync::Arc;

use relaybot::dispatch::DispatchEngine;
use relaybot::message::{CanonicalMessage, ChatId, Media, MediaKind, MediaRef, Platform};
use relaybot::pipelines::build_pipelines;
use relaybot::storage::{HistoryRecord, Store};
use relaybot::transport::Progress;

use crate::fakes::{all_services, pipeline_configs, RecordingSynthesizer};
use crate::support::{registry_with, telegram_chat, text_message, Call, RecordingTransport};

struct Harness {
    transport: Arc<RecordingTransport>,
    engine: Arc<DispatchEngine>,
    store: Store,
    synthesizer: Arc<RecordingSynthesizer>,
}

impl Harness {
    async fn new(pipelines: &str) -> Self {
        Self::with_transport(pipelines, RecordingTransport::new(Platform::Telegram)).await
    }

    async fn with_transport(pipelines: &str, transport: RecordingTransport) -> Self {
        let transport = Arc::new(transport);
        let store = Store::in_memory().await.expect("store");
        let synthesizer = Arc::new(RecordingSynthesizer::default());
        let services = all_services(Arc::clone(&synthesizer));
        let mut engine = DispatchEngine::new(registry_with(Arc::clone(&transport)));
        build_pipelines(&pipeline_configs(pipelines), &services, &store, &mut engine)
            .expect("pipelines should build");
        Self {
            transport,
            engine: Arc::new(engine),
            store,
            synthesizer,
        }
    }

    async fn send(&self, message: CanonicalMessage) {
        self.engine.dispatch(message).join().await;
    }
}

fn with_media(mut message: CanonicalMessage, kind: MediaKind) -> CanonicalMessage {
    message.media = Some(MediaRef {
        kind,
        mime_type: None,
        locator: "file-1".to_owned(),
    });
    message
}

#[tokio::test]
async fn help_lists_pipelines_in_order() {
    let harness = Harness::new(
        r#"
[[pipelines]]
kind = "help"

[[pipelines]]
kind = "ask"

[[pipelines]]
kind = "history"
"#,
    )
    .await;
    let chat = telegram_chat("1");
    harness.send(text_message(&chat, "1", "#help")).await;

    let replies = harness.transport.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(
        replies[0],
        "Available commands:\n- #help: show this list\n- #ask <question>: answer a question"
    );
}

#[tokio::test]
async fn ask_replies_with_the_answer() {
    let harness = Harness::new("[[pipelines]]\nkind = \"ask\"\n").await;
    let chat = telegram_chat("1");

    harness.send(text_message(&chat, "1", "#ask meaning of life")).await;
    assert_eq!(harness.transport.replies(), vec!["forty-two".to_owned()]);
    assert_eq!(
        harness.transport.progress(),
        vec![Progress::Started, Progress::Done]
    );

    harness.send(text_message(&chat, "2", "#ask")).await;
    assert_eq!(harness.transport.replies().len(), 1);
    assert_eq!(harness.transport.progress().last(), Some(&Progress::Skipped));
}

#[tokio::test]
async fn history_records_external_and_own_messages() {
    let harness = Harness::new("[[pipelines]]\nkind = \"history\"\n").await;
    let chat = telegram_chat("1");

    harness.send(text_message(&chat, "1", "hello")).await;
    let mut own = text_message(&chat, "2", "hi back");
    own.is_self_authored = true;
    harness.send(own).await;

    let recent = harness
        .store
        .history()
        .recent(&chat, 10)
        .await
        .expect("recent");
    let flags: Vec<(&str, bool)> = recent
        .iter()
        .map(|r| (r.text.as_str(), r.is_self))
        .collect();
    assert_eq!(flags, vec![("hello", false), ("hi back", true)]);
    assert!(harness.transport.calls().is_empty(), "history is silent");
}

#[tokio::test]
async fn forget_needs_confirmation() {
    let harness = Harness::new("[[pipelines]]\nkind = \"forget\"\n").await;
    let chat = telegram_chat("1");
    let history = harness.store.history();
    history
        .append(&HistoryRecord::from_message(&text_message(&chat, "0", "old")))
        .await
        .expect("append");

    harness.send(text_message(&chat, "1", "#forget")).await;
    assert_eq!(history.recent(&chat, 10).await.expect("recent").len(), 1);
    assert!(harness.transport.replies()[0].contains("#forget again"));

    harness.send(text_message(&chat, "2", "#forget")).await;
    assert!(history.recent(&chat, 10).await.expect("recent").is_empty());
    assert_eq!(
        harness.transport.replies()[1],
        "Forgot 1 stored messages."
    );
}

#[tokio::test]
async fn gallery_collects_only_when_enabled() {
    let transport = RecordingTransport::with_download(
        Platform::Telegram,
        Media::new("image/jpeg", b"jpeg bytes".to_vec()),
    );
    let harness = Harness::with_transport("[[pipelines]]\nkind = \"gallery\"\n", transport).await;
    let chat = telegram_chat("1");
    let gallery = harness.store.gallery();

    harness
        .send(with_media(text_message(&chat, "1", ""), MediaKind::Image))
        .await;
    assert_eq!(gallery.count(&chat).await.expect("count"), 0);
    assert!(harness.transport.progress().is_empty(), "disabled gallery is silent");

    harness.send(text_message(&chat, "2", "#gallery(on)")).await;
    assert!(gallery.is_enabled(&chat).await.expect("enabled"));

    harness
        .send(with_media(text_message(&chat, "3", ""), MediaKind::Image))
        .await;
    harness
        .send(with_media(text_message(&chat, "4", ""), MediaKind::Image))
        .await;
    assert_eq!(gallery.count(&chat).await.expect("count"), 1);
    assert_eq!(
        harness.transport.progress(),
        vec![Progress::Done, Progress::Done, Progress::Skipped]
    );
}

#[tokio::test]
async fn transcribe_replies_with_text() {
    let transport = RecordingTransport::with_download(
        Platform::Telegram,
        Media::new("audio/ogg", b"opus".to_vec()),
    );
    let harness =
        Harness::with_transport("[[pipelines]]\nkind = \"transcribe\"\n", transport).await;
    let chat = telegram_chat("1");

    harness
        .send(with_media(text_message(&chat, "1", ""), MediaKind::Audio))
        .await;
    let replies = harness.transport.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("hello from a voice note"));
    assert!(replies[0].contains("5 words"));
    assert_eq!(
        harness.transport.progress(),
        vec![Progress::Started, Progress::Halfway, Progress::Done]
    );

    harness.send(text_message(&chat, "2", "#transcribe")).await;
    assert_eq!(harness.transport.progress().last(), Some(&Progress::Skipped));
}

#[tokio::test]
async fn transcribe_skips_when_download_fails() {
    let harness = Harness::new("[[pipelines]]\nkind = \"transcribe\"\n").await;
    let chat = telegram_chat("1");
    harness
        .send(with_media(text_message(&chat, "1", ""), MediaKind::Audio))
        .await;
    assert!(harness.transport.replies().is_empty());
    assert_eq!(harness.transport.progress().last(), Some(&Progress::Skipped));
}

#[tokio::test]
async fn imagine_sends_each_image_with_prompt() {
    let harness = Harness::new("[[pipelines]]\nkind = \"imagine\"\n").await;
    let chat = telegram_chat("1");
    harness
        .send(text_message(&chat, "1", "#imagine a lighthouse at dusk"))
        .await;

    let images: Vec<Call> = harness
        .transport
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Image { .. }))
        .collect();
    assert_eq!(
        images,
        vec![Call::Image {
            chat: chat.clone(),
            caption: Some("a lighthouse at dusk".to_owned()),
        }]
    );
}

#[tokio::test]
async fn say_uses_requested_or_default_language() {
    let harness = Harness::new("[[pipelines]]\nkind = \"say\"\nlanguage = \"fr\"\n").await;
    let chat = telegram_chat("1");

    harness.send(text_message(&chat, "1", "#say(de) Guten Tag")).await;
    harness.send(text_message(&chat, "2", "#say bonjour")).await;
    harness.send(text_message(&chat, "3", "#say(en)")).await;

    let languages = harness
        .synthesizer
        .languages
        .lock()
        .map(|l| l.clone())
        .unwrap_or_default();
    assert_eq!(languages, vec!["de".to_owned(), "fr".to_owned()]);
    let audio = harness
        .transport
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(call, Call::Audio { mime_type, .. } if mime_type == "audio/mpeg")
        })
        .count();
    assert_eq!(audio, 2);
    assert_eq!(harness.transport.progress().last(), Some(&Progress::Skipped));
}

#[tokio::test]
async fn undo_deletes_previous_own_message_and_command() {
    let harness = Harness::new("[[pipelines]]\nkind = \"undo\"\n").await;
    let chat: ChatId = telegram_chat("1");
    let history = harness.store.history();
    let mut earlier = text_message(&chat, "m1", "oops");
    earlier.is_self_authored = true;
    history
        .append(&HistoryRecord::from_message(&earlier))
        .await
        .expect("append");

    let mut command = text_message(&chat, "m2", "#undo");
    command.is_self_authored = true;
    harness.send(command).await;

    assert_eq!(
        harness.transport.calls(),
        vec![
            Call::Delete {
                message_id: "m1".to_owned()
            },
            Call::Delete {
                message_id: "m2".to_owned()
            },
        ]
    );
    assert!(history.recent(&chat, 10).await.expect("recent").is_empty());
}

#[tokio::test]
async fn undo_ignores_messages_from_others() {
    let harness = Harness::new("[[pipelines]]\nkind = \"undo\"\n").await;
    let chat = telegram_chat("1");
    harness.send(text_message(&chat, "m1", "#undo")).await;
    assert!(harness.transport.calls().is_empty());
}

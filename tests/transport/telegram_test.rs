//! Tests for `src/transport/telegram.rs` against a scripted Bot API server.

use relaybot::transport::telegram::{reaction_emoji, TelegramTransport};
use relaybot::transport::{Progress, Transport};

use crate::support::http::{closed_port_url, ScriptedServer};
use crate::support::{telegram_chat, text_message};

fn transport(token: &str, api_url: &str) -> TelegramTransport {
    let api_url = reqwest::Url::parse(api_url).expect("valid api url");
    TelegramTransport::new(token).with_api_url(api_url)
}

#[tokio::test]
async fn reply_quotes_the_triggering_message() {
    let server = ScriptedServer::start(vec![(
        400,
        r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#.to_owned(),
    )])
    .await;
    let telegram = transport("123:abc", server.base_url());
    let message = text_message(&telegram_chat("42"), "7", "#ask why");

    let result = telegram.reply(&message, "because").await;
    assert!(result.is_err(), "scripted server rejects the send");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .request_line
        .to_lowercase()
        .contains("/bot123:abc/sendmessage"));
    let body = requests[0].json();
    assert_eq!(body["chat_id"], 42);
    assert_eq!(body["text"], "because");
    assert_eq!(body["reply_parameters"]["message_id"], 7);
}

#[tokio::test]
async fn progress_becomes_a_reaction() {
    let server = ScriptedServer::start(vec![(200, r#"{"ok":true,"result":true}"#.to_owned())]).await;
    let telegram = transport("123:abc", server.base_url());
    let message = text_message(&telegram_chat("-1001"), "55", "#imagine a cat");

    telegram
        .mark_progress(&message, Progress::Done)
        .await
        .expect("reaction accepted");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .request_line
        .starts_with("POST /bot123:abc/setMessageReaction"));
    let body = requests[0].json();
    assert_eq!(body["chat_id"], -1001);
    assert_eq!(body["message_id"], 55);
    assert_eq!(body["reaction"][0]["emoji"], reaction_emoji(Progress::Done));
}

#[tokio::test]
async fn failed_reaction_error_hides_the_token() {
    let telegram = transport("123456:SECRET-TOKEN", &closed_port_url().await);
    let message = text_message(&telegram_chat("42"), "7", "#ask");

    let err = telegram
        .mark_progress(&message, Progress::Started)
        .await
        .expect_err("nothing listens on the api url");
    assert!(!err.to_string().contains("SECRET-TOKEN"), "{err}");
    assert!(!format!("{err:?}").contains("SECRET-TOKEN"), "{err:?}");
}

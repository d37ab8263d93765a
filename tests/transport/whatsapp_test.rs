//! Tests for the WhatsApp bridge long-poll loop.

use relaybot::transport::whatsapp::events::{poll_events, WhatsAppEvent};
use relaybot::transport::TransportError;

use crate::support::http::ScriptedServer;

#[tokio::test]
async fn poll_delivers_good_events_and_stops_on_bridge_error() {
    let batch = serde_json::json!([
        { "type": "message", "jid": "491700000000@c.us", "message_id": "M1", "text": "#help" },
        { "type": "message", "jid": "491700000000@c.us", "text": "missing id" },
        { "type": "receipt", "message_id": "M1" },
        { "type": "disconnected", "reason": "phone offline" },
    ]);
    let server = ScriptedServer::start(vec![
        (200, batch.to_string()),
        (503, "bridge restarting".to_owned()),
    ])
    .await;

    let mut received = Vec::new();
    let poll_url = format!("{}/events/poll", server.base_url());
    let result = poll_events(&poll_url, |event| received.push(event)).await;

    match result {
        Err(TransportError::Backend { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "bridge restarting");
        }
        other => panic!("expected backend error, got {other:?}"),
    }
    assert_eq!(received.len(), 2);
    assert!(matches!(&received[0], WhatsAppEvent::Message(m) if m.message_id == "M1"));
    assert!(matches!(
        &received[1],
        WhatsAppEvent::Disconnected { reason: Some(reason) } if reason == "phone offline"
    ));

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].request_line.starts_with("GET /events/poll"));
}

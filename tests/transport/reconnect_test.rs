//! Tests for the shared receive-loop reconnect policy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use relaybot::message::Platform;
use relaybot::transport::{reconnect_forever, TransportError, RECONNECT_DELAY};

#[tokio::test(start_paused = true)]
async fn failed_sessions_are_retried_after_a_fixed_delay() {
    const FAILURES: usize = 3;
    let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let connected = Arc::new(Notify::new());

    let receive_loop = {
        let attempts = Arc::clone(&attempts);
        let connected = Arc::clone(&connected);
        tokio::spawn(reconnect_forever(Platform::Signal, move || {
            let attempts = Arc::clone(&attempts);
            let connected = Arc::clone(&connected);
            async move {
                let attempt = {
                    let mut attempts = attempts.lock().expect("attempts lock");
                    attempts.push(Instant::now());
                    attempts.len()
                };
                if attempt <= FAILURES {
                    return Err(TransportError::Closed);
                }
                connected.notify_one();
                std::future::pending::<()>().await;
                Ok(())
            }
        }))
    };

    tokio::time::timeout(Duration::from_secs(60), connected.notified())
        .await
        .expect("session should eventually stay connected");
    receive_loop.abort();

    let attempts = attempts.lock().expect("attempts lock").clone();
    assert_eq!(attempts.len(), FAILURES + 1);
    for pair in attempts.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= RECONNECT_DELAY && gap < RECONNECT_DELAY + Duration::from_millis(10),
            "unexpected gap {gap:?}"
        );
    }
}

//! `sreq` is restricted to the fixed internal topics (SPEC_FULL.md §4.5): a
//! non-internal topic must reply `TopicNonexistent` immediately, even when a
//! dynamically registered responder exists for that topic — `req` would
//! fall back to it, but `sreq` must not.

#[path = "harness.rs"]
mod harness;

use broker_wire::{Message, Payload};
use futures_util::SinkExt;
use harness::*;
use rusty_broker::router::BROKER_CHANNEL_NAME;

#[tokio::test]
async fn sreq_with_non_internal_topic_does_not_fall_back_to_a_registered_responder() {
    let addr = spawn_broker().await;

    let mut alpha = connect(addr).await;
    let alpha_name = register(&mut alpha, "alpha").await;
    add_response_listener(&mut alpha, &alpha_name, "ping").await;

    let mut beta = connect(addr).await;
    let beta_name = register(&mut beta, "beta").await;

    let sreq = Message::Sreq {
        header: req_header(99, "ping", &beta_name, BROKER_CHANNEL_NAME),
        payload: Payload::Json(serde_json::json!({ "n": 1 })),
    };
    beta.send(sreq).await.unwrap();

    let reply = recv(&mut beta).await;
    let Message::Res { header, payload } = reply else { panic!("expected res, got {reply:?}") };
    assert_eq!(header.id, 99);
    assert_eq!(header.error, broker_wire::error_codes::TOPIC_NONEXISTENT);
    assert_eq!(payload.as_json().unwrap(), &serde_json::json!({}));

    // alpha never saw the sreq forwarded to it.
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(200), recv(&mut alpha)).await.is_err()
    );
}

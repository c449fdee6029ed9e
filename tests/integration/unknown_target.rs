//! Scenario 2 from SPEC_FULL.md §8: a `req` addressed to a channel that was
//! never registered comes back as a `res` carrying *TargetChannelNonexistent*.

#[path = "harness.rs"]
mod harness;

use broker_wire::{Message, Payload};
use futures_util::SinkExt;
use harness::*;

#[tokio::test]
async fn request_to_unregistered_channel_bounces_with_error() {
    let addr = spawn_broker().await;

    let mut beta = connect(addr).await;
    let beta_name = register(&mut beta, "beta").await;

    let req = Message::Req {
        header: req_header(7, "ping", &beta_name, "gamma"),
        payload: Payload::Json(serde_json::Value::Null),
    };
    beta.send(req).await.unwrap();

    let reply = recv(&mut beta).await;
    let Message::Res { header, payload } = reply else { panic!("expected res, got {reply:?}") };
    assert_eq!(header.id, 7);
    assert_eq!(header.error, broker_wire::error_codes::TARGET_CHANNEL_NONEXISTENT);
    assert_eq!(payload.as_json().unwrap(), &serde_json::json!({}));
}

//! Scenario 1 from SPEC_FULL.md §8: register, bind a response topic, and
//! route a `req` through to it.

#[path = "harness.rs"]
mod harness;

use broker_wire::{ContentType, Message, Payload};
use futures_util::SinkExt;
use harness::*;

#[tokio::test]
async fn client_request_reaches_registered_responder_and_response_returns() {
    let addr = spawn_broker().await;

    let mut alpha = connect(addr).await;
    let alpha_name = register(&mut alpha, "alpha").await;
    add_response_listener(&mut alpha, &alpha_name, "ping").await;

    let mut beta = connect(addr).await;
    let beta_name = register(&mut beta, "beta").await;

    let req = Message::Req {
        header: req_header(42, "ping", &beta_name, &alpha_name),
        payload: Payload::Json(serde_json::json!({ "n": 1 })),
    };
    beta.send(req).await.unwrap();

    let forwarded = recv(&mut alpha).await;
    let Message::Req { header, payload } = forwarded else { panic!("expected req") };
    assert_eq!(header.id, 42);
    assert_eq!(header.source, beta_name);
    assert_eq!(payload.as_json().unwrap()["n"], 1);

    let res = Message::Res {
        header: broker_wire::ReqHeader {
            id: header.id,
            content_type: ContentType::Json,
            error: broker_wire::error_codes::OK,
            topic: header.topic.clone(),
            source: alpha_name.clone(),
            target: header.source.clone(),
        },
        payload: Payload::Json(serde_json::json!({ "n": 2 })),
    };
    alpha.send(res).await.unwrap();

    let reply = recv(&mut beta).await;
    let Message::Res { header, payload } = reply else { panic!("expected res") };
    assert_eq!(header.id, 42);
    assert_eq!(header.error, broker_wire::error_codes::OK);
    assert_eq!(payload.as_json().unwrap()["n"], 2);
}

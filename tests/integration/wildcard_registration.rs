//! Scenario 6 from SPEC_FULL.md §8: a `#`-bearing requested name is resolved
//! to a fresh, distinct channel name on every registration.

#[path = "harness.rs"]
mod harness;

use harness::*;
use regex::Regex;

#[tokio::test]
async fn repeated_hash_registration_yields_two_distinct_live_names() {
    let addr = spawn_broker().await;

    let mut c1 = connect(addr).await;
    let name1 = register(&mut c1, "worker-#").await;

    let mut c2 = connect(addr).await;
    let name2 = register(&mut c2, "worker-#").await;

    assert_ne!(name1, name2);
    let pattern = Regex::new(r"^worker-[0-9a-f]+$").unwrap();
    assert!(pattern.is_match(&name1), "{name1} does not match worker-<id>");
    assert!(pattern.is_match(&name2), "{name2} does not match worker-<id>");

    // Both channels are live concurrently: a getChannels lookup against the
    // broker sees both.
    let body = serde_json::json!({ "channelName": "worker-*", "type": "glob" });
    let req = broker_wire::Message::Req {
        header: req_header(1, "getChannels", &name1, rusty_broker::router::BROKER_CHANNEL_NAME),
        payload: broker_wire::Payload::Json(body),
    };
    use futures_util::SinkExt;
    c1.send(req).await.unwrap();
    let reply = recv(&mut c1).await;
    let broker_wire::Message::Res { payload, .. } = reply else { panic!("expected res") };
    let channels = payload.as_json().unwrap()["channels"].as_array().unwrap();
    let names: Vec<&str> = channels.iter().map(|v| v.as_str().unwrap()).collect();
    assert!(names.contains(&name1.as_str()));
    assert!(names.contains(&name2.as_str()));
}

//! Scenario 4 from SPEC_FULL.md §8: a worker that disconnects before acking
//! its in-flight item causes that item to be redelivered to a survivor.

#[path = "harness.rs"]
mod harness;

use broker_wire::{ContentType, Message, Payload, PushHeader};
use futures_util::SinkExt;
use harness::*;

#[tokio::test]
async fn item_in_flight_to_a_dead_worker_is_redelivered_to_the_survivor() {
    let addr = spawn_broker().await;

    let mut producer = connect(addr).await;
    let producer_name = register(&mut producer, "producer").await;

    let mut w1 = connect(addr).await;
    let w1_name = register(&mut w1, "w1").await;
    add_pull_listener(&mut w1, &w1_name, "job").await;

    let mut w2 = connect(addr).await;
    let w2_name = register(&mut w2, "w2").await;
    add_pull_listener(&mut w2, &w2_name, "job").await;

    let push = Message::Push {
        header: PushHeader {
            id: 1,
            content_type: ContentType::String,
            topic: "job".into(),
            source: producer_name.clone(),
            target: "".into(),
        },
        items: vec![Payload::String("a".into())],
    };
    producer.send(push).await.unwrap();

    let first = recv(&mut w1).await;
    let Message::Push { items, .. } = &first else { panic!("expected push") };
    assert_eq!(items, &[Payload::String("a".into())]);

    drop(w1);

    let redelivered = recv(&mut w2).await;
    let Message::Push { items, .. } = redelivered else { panic!("expected push, got {redelivered:?}") };
    assert_eq!(items, vec![Payload::String("a".into())]);
}

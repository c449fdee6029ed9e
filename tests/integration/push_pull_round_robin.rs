//! Scenario 3 from SPEC_FULL.md §8: two pull workers split a four-item push
//! round-robin, each acks what it received, and nothing is redelivered.

#[path = "harness.rs"]
mod harness;

use broker_wire::{AckHeader, ContentType, Message, Payload, PushHeader};
use futures_util::SinkExt;
use harness::*;

#[tokio::test]
async fn four_item_push_splits_round_robin_across_two_workers() {
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
            id: 100,
            content_type: ContentType::String,
            topic: "job".into(),
            source: producer_name.clone(),
            target: "".into(),
        },
        items: vec![
            Payload::String("a".into()),
            Payload::String("b".into()),
            Payload::String("c".into()),
            Payload::String("d".into()),
        ],
    };
    producer.send(push).await.unwrap();

    let w1_items = [recv_item(&mut w1).await, recv_item(&mut w1).await];
    let w2_items = [recv_item(&mut w2).await, recv_item(&mut w2).await];

    // Round-robin starting point depends on which worker registered first,
    // but the split must be 2-and-2 with original item order preserved.
    assert_eq!(w1_items.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(w2_items.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(), vec!["b", "d"]);

    for (id, _) in w1_items {
        w1.send(Message::Ack { header: AckHeader { id, topic: "job".into() } }).await.unwrap();
    }
    for (id, _) in w2_items {
        w2.send(Message::Ack { header: AckHeader { id, topic: "job".into() } }).await.unwrap();
    }

    // No further items show up after acking; nothing was redelivered.
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(200), recv(&mut w1)).await.is_err()
    );
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(200), recv(&mut w2)).await.is_err()
    );
}

async fn recv_item(client: &mut Client) -> (u64, String) {
    let message = recv(client).await;
    let Message::Push { header, items } = message else { panic!("expected push, got {message:?}") };
    assert_eq!(items.len(), 1);
    let Payload::String(s) = &items[0] else { panic!("expected string payload") };
    (header.id, s.clone())
}

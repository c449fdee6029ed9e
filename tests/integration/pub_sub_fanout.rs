//! Scenario 5 from SPEC_FULL.md §8: two subscribers each see both `pub`
//! messages, in the order the publisher sent them.

#[path = "harness.rs"]
mod harness;

use broker_wire::{ContentType, Message, Payload, PubHeader};
use futures_util::SinkExt;
use harness::*;

#[tokio::test]
async fn both_subscribers_see_both_messages_in_order() {
    let addr = spawn_broker().await;

    let mut publisher = connect(addr).await;
    let publisher_name = register(&mut publisher, "publisher").await;

    let mut s1 = connect(addr).await;
    let s1_name = register(&mut s1, "s1").await;
    add_subscribe_listener(&mut s1, &s1_name, "news").await;

    let mut s2 = connect(addr).await;
    let s2_name = register(&mut s2, "s2").await;
    add_subscribe_listener(&mut s2, &s2_name, "news").await;

    for n in [1u8, 2u8] {
        let pub_msg = Message::Pub {
            header: PubHeader {
                id: n as u64,
                content_type: ContentType::String,
                topic: "news".into(),
                source: publisher_name.clone(),
                target: "".into(),
            },
            payload: Payload::String(format!("p{n}")),
        };
        publisher.send(pub_msg).await.unwrap();
    }

    for s in [&mut s1, &mut s2] {
        let first = recv(s).await;
        let Message::Pub { payload, .. } = first else { panic!("expected pub") };
        assert_eq!(payload, Payload::String("p1".into()));

        let second = recv(s).await;
        let Message::Pub { payload, .. } = second else { panic!("expected pub") };
        assert_eq!(payload, Payload::String("p2".into()));
    }
}

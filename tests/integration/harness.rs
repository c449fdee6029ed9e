//! Shared scaffolding for broker integration tests: spin up a broker bound
//! to `127.0.0.1:0`, connect plain `Framed<TcpStream, WireCodec>` clients to
//! it, and provide the `register`/`addXListener` handshakes every scenario
//! needs.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use broker_wire::{ContentType, Message, Payload, ReqHeader};
use futures_util::{SinkExt, StreamExt};
use rusty_broker::config::{ListenConfig, ListenKind};
use rusty_broker::connection;
use rusty_broker::router::{Router, BROKER_CHANNEL_NAME};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

pub type Client = Framed<TcpStream, broker_wire::WireCodec>;

/// Starts a broker on an ephemeral TCP port and returns its address. The
/// broker keeps running for the lifetime of the test process (tests share
/// no state across brokers, so leaking the task is harmless).
pub async fn spawn_broker() -> SocketAddr {
    let (router_tx, router_rx) = mpsc::channel(1024);
    tokio::spawn(Router::new().run(router_rx));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let listen = ListenConfig { kind: ListenKind::Tcp, address: addr.to_string() };
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        connection::serve(&listen, router_tx, shutdown_rx).await.unwrap();
    });

    // Give the listener a moment to actually bind before tests dial it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

pub async fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, broker_wire::WireCodec::new())
}

static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// Sends a `register` internal request with `requested_name` as the source,
/// and returns the name the broker actually assigned.
pub async fn register(client: &mut Client, requested_name: &str) -> String {
    let req = Message::Req {
        header: ReqHeader {
            id: next_id(),
            content_type: ContentType::Json,
            error: 0,
            topic: "register".into(),
            source: requested_name.into(),
            target: BROKER_CHANNEL_NAME.into(),
        },
        payload: Payload::Json(serde_json::Value::Null),
    };
    client.send(req).await.unwrap();
    let res = recv(client).await;
    let Message::Res { payload, .. } = res else { panic!("expected res, got {res:?}") };
    payload.as_json().unwrap().get("channelName").unwrap().as_str().unwrap().to_owned()
}

pub async fn add_response_listener(client: &mut Client, channel_name: &str, topic: &str) {
    internal_request(client, channel_name, "addResponseListener", serde_json::json!({ "topic": topic })).await;
}

pub async fn add_pull_listener(client: &mut Client, channel_name: &str, topic: &str) {
    internal_request(
        client,
        channel_name,
        "addPullListener",
        serde_json::json!({ "topic": topic, "options": {} }),
    )
    .await;
}

pub async fn add_subscribe_listener(client: &mut Client, channel_name: &str, topic: &str) {
    internal_request(
        client,
        channel_name,
        "addSubscribeListener",
        serde_json::json!({ "topic": topic, "options": {} }),
    )
    .await;
}

async fn internal_request(client: &mut Client, channel_name: &str, topic: &str, body: serde_json::Value) {
    let req = Message::Req {
        header: ReqHeader {
            id: next_id(),
            content_type: ContentType::Json,
            error: 0,
            topic: topic.into(),
            source: channel_name.into(),
            target: BROKER_CHANNEL_NAME.into(),
        },
        payload: Payload::Json(body),
    };
    client.send(req).await.unwrap();
    let res = recv(client).await;
    let Message::Res { header, .. } = &res else { panic!("expected res, got {res:?}") };
    assert_eq!(header.error, broker_wire::error_codes::OK, "internal request {topic} failed: {res:?}");
}

pub async fn recv(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
        .expect("codec error")
}

pub fn req_header(id: u64, topic: &str, source: &str, target: &str) -> ReqHeader {
    ReqHeader { id, content_type: ContentType::Json, error: 0, topic: topic.into(), source: source.into(), target: target.into() }
}

//! Router: classifies each decoded inbound message and either invokes an
//! internal handler, forwards raw bytes to another channel, or enqueues
//! into a task queue.
//!
//! A `Router` owns the `ChannelRegistry` and `QueueTable` outright and is
//! driven by a single `tokio` task (see `connection.rs`) — this is the
//! "single-threaded cooperative routing" context the concurrency model
//! requires. Nothing here ever awaits.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use broker_wire::{
    error_codes, ContentType, Message, MonHeader, MonitorEvent,
    MonitorEventKind as WireMonitorEventKind, Payload, ReqHeader,
};

use crate::connection::{ConnectionId, OutboundFrame};
use crate::pattern::{Pattern, PatternKind};
use crate::queues::QueueTable;
use crate::registry::{ChannelRegistry, MonitorEventKind, MonitorNotification};

/// The reserved channel name internal requests are addressed to.
pub const BROKER_CHANNEL_NAME: &str = "broker";

/// Whether a non-internal topic on a broker-addressed request may fall back
/// to `findResponseTopic`'s broker-wide search. `req` allows it; `sreq` is
/// restricted to the fixed internal topics and never falls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllowFallback {
    Yes,
    No,
}

/// What the connection layer reports to the router.
pub enum RouterInbound {
    Connected { connection_id: ConnectionId, sender: mpsc::Sender<OutboundFrame> },
    Disconnected(ConnectionId),
    Frame { connection_id: ConnectionId, raw: Bytes, message: Message },
}

pub struct Router {
    registry: ChannelRegistry,
    queues: QueueTable,
    connections: HashMap<ConnectionId, mpsc::Sender<OutboundFrame>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Router { registry: ChannelRegistry::new(), queues: QueueTable::new(), connections: HashMap::new() }
    }

    /// Runs the router's event loop until `inbound` closes, i.e. every
    /// connection task has shut down and dropped its sender.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<RouterInbound>) {
        while let Some(event) = inbound.recv().await {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: RouterInbound) {
        match event {
            RouterInbound::Connected { connection_id, sender } => {
                self.connections.insert(connection_id, sender);
            }
            RouterInbound::Disconnected(connection_id) => self.handle_disconnect(connection_id),
            RouterInbound::Frame { connection_id, raw, message } => {
                self.dispatch(connection_id, raw, message);
            }
        }
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
        let (removed, notifications) = self.registry.unregister_by_connection(connection_id);
        if let Some(channel) = removed {
            let redelivered = self.queues.remove_member_everywhere(&channel.name);
            self.send_all(redelivered);
        }
        self.send_monitor_notifications(notifications);
    }

    fn dispatch(&mut self, connection_id: ConnectionId, raw: Bytes, message: Message) {
        match message {
            Message::Req { header, payload } => self.dispatch_req(connection_id, raw, header, payload),
            Message::Sreq { header, payload } => {
                self.dispatch_internal(connection_id, header, &payload, AllowFallback::No)
            }
            Message::Res { header, .. } => self.forward_or_drop(&header.target, raw),
            Message::Push { header, items } => {
                let dispatched =
                    self.queues.enqueue_push(&header.topic, &header.source, header.content_type, items);
                self.send_all(dispatched);
            }
            Message::Pub { header, .. } => {
                let members = self.queues.sub_members(&header.topic).to_vec();
                for member in members {
                    if let Some(channel) = self.registry.get(&member) {
                        let _ = channel.sender.try_send(OutboundFrame::Raw(raw.clone()));
                    }
                }
            }
            Message::Ack { header } => {
                if !self.queues.ack(&header.topic, header.id) {
                    debug!(topic = %header.topic, id = header.id, "ack for unknown or already-acked item");
                }
            }
            Message::Sub { .. } | Message::Pull { .. } | Message::Mon { .. } => {
                warn!("received a kind that clients never send as a top-level message; dropping");
            }
        }
    }

    fn dispatch_req(&mut self, connection_id: ConnectionId, raw: Bytes, header: ReqHeader, payload: Payload) {
        if header.target != BROKER_CHANNEL_NAME {
            self.forward_or_reply_unknown_target(connection_id, &header, raw);
            return;
        }
        self.dispatch_internal(connection_id, header, &payload, AllowFallback::Yes);
    }

    fn forward_or_reply_unknown_target(&mut self, connection_id: ConnectionId, header: &ReqHeader, raw: Bytes) {
        if let Some(channel) = self.registry.get(&header.target) {
            let _ = channel.sender.try_send(OutboundFrame::Raw(raw));
            return;
        }
        self.reply_error(connection_id, header, error_codes::TARGET_CHANNEL_NONEXISTENT);
    }

    fn forward_or_drop(&mut self, target: &str, raw: Bytes) {
        if let Some(channel) = self.registry.get(target) {
            let _ = channel.sender.try_send(OutboundFrame::Raw(raw));
        } else {
            debug!(%target, "res target no longer exists; dropping silently");
        }
    }

    /// Handles a `req`/`sreq` addressed to the broker itself: one of the
    /// fixed internal topics, or — for `req` only — a fallback lookup via
    /// `findResponseTopic` for a dynamically registered broker-wide
    /// responder. `sreq` is restricted to the fixed internal topics: an
    /// unknown topic on `sreq` replies `TopicNonexistent` immediately
    /// rather than falling back.
    fn dispatch_internal(
        &mut self,
        connection_id: ConnectionId,
        header: ReqHeader,
        payload: &Payload,
        allow_fallback: AllowFallback,
    ) {
        let is_internal_topic = matches!(
            &header.topic[..],
            "register" | "addResponseListener" | "addPullListener" | "addSubscribeListener"
                | "getChannels" | "watchChannels"
        );

        if !is_internal_topic {
            if allow_fallback == AllowFallback::Yes {
                if let Some(channel) = self.registry.find_response_topic(BROKER_CHANNEL_NAME, &header.topic) {
                    let forwarded = Message::Req {
                        header: ReqHeader { target: channel.name.clone(), ..header },
                        payload: payload.clone(),
                    };
                    let _ = channel.sender.try_send(OutboundFrame::Message(forwarded));
                    return;
                }
            }
            self.reply_error(connection_id, &header, error_codes::TOPIC_NONEXISTENT);
            return;
        }

        let body = payload.as_json().cloned().unwrap_or(Value::Null);
        let outcome = match &header.topic[..] {
            "register" => self.handle_register(connection_id, &header),
            "addResponseListener" => self.handle_add_response_listener(connection_id, &body),
            "addPullListener" => self.handle_add_pull_listener(connection_id, &body),
            "addSubscribeListener" => self.handle_add_subscribe_listener(connection_id, &body),
            "getChannels" => self.handle_get_channels(&body),
            "watchChannels" => self.handle_watch_channels(connection_id, &body),
            _ => unreachable!("filtered by is_internal_topic above"),
        };

        match outcome {
            Ok(value) => self.reply_ok(connection_id, &header, value),
            Err(code) => self.reply_error(connection_id, &header, code),
        }
    }

    fn handle_register(&mut self, connection_id: ConnectionId, header: &ReqHeader) -> Result<Value, u8> {
        let sender = self.connections.get(&connection_id).cloned().ok_or(error_codes::INVALID_PARAMETER)?;
        match self.registry.register(&header.source, connection_id, sender) {
            Ok((name, notifications)) => {
                self.send_monitor_notifications(notifications);
                Ok(json!({ "channelName": name }))
            }
            Err(_) => Err(error_codes::REGISTER_FAIL),
        }
    }

    fn requester_channel_name(&self, connection_id: ConnectionId) -> Option<String> {
        self.registry.channel_name_for_connection(connection_id).map(str::to_owned)
    }

    fn handle_add_response_listener(&mut self, connection_id: ConnectionId, body: &Value) -> Result<Value, u8> {
        let topic = body.get("topic").and_then(Value::as_str).ok_or(error_codes::INVALID_PARAMETER)?;
        let channel_name = self.requester_channel_name(connection_id).ok_or(error_codes::INVALID_PARAMETER)?;
        let result = self.registry.add_response(&channel_name, topic);
        Ok(json!({ "result": result }))
    }

    fn handle_add_pull_listener(&mut self, connection_id: ConnectionId, body: &Value) -> Result<Value, u8> {
        let topic = body.get("topic").and_then(Value::as_str).ok_or(error_codes::INVALID_PARAMETER)?;
        let options = body.get("options").cloned().unwrap_or(Value::Null);
        let channel_name = self.requester_channel_name(connection_id).ok_or(error_codes::INVALID_PARAMETER)?;
        let result = self.registry.add_pull(&channel_name, topic, options);
        if result {
            let dispatched = self.queues.add_pull_member(topic, &channel_name);
            self.send_all(dispatched);
        }
        Ok(json!({ "result": result }))
    }

    fn handle_add_subscribe_listener(&mut self, connection_id: ConnectionId, body: &Value) -> Result<Value, u8> {
        let topic = body.get("topic").and_then(Value::as_str).ok_or(error_codes::INVALID_PARAMETER)?;
        let options = body.get("options").cloned().unwrap_or(Value::Null);
        let channel_name = self.requester_channel_name(connection_id).ok_or(error_codes::INVALID_PARAMETER)?;
        let result = self.registry.add_subscribe(&channel_name, topic, options);
        if result {
            self.queues.add_sub_member(topic, &channel_name);
        }
        Ok(json!({ "result": result }))
    }

    fn handle_get_channels(&mut self, body: &Value) -> Result<Value, u8> {
        let channel_name = body.get("channelName").and_then(Value::as_str).ok_or(error_codes::INVALID_PARAMETER)?;
        let kind = parse_pattern_kind(body.get("type"))?;
        let pattern = Pattern::compile(channel_name, kind).map_err(|_| error_codes::INVALID_PARAMETER)?;
        let channels = self.registry.find_channel_names(&pattern);
        Ok(json!({ "channels": channels }))
    }

    fn handle_watch_channels(&mut self, connection_id: ConnectionId, body: &Value) -> Result<Value, u8> {
        let channel_name = body.get("channelName").and_then(Value::as_str).ok_or(error_codes::INVALID_PARAMETER)?;
        let kind = parse_pattern_kind(body.get("type"))?;
        let pattern = Pattern::compile(channel_name, kind).map_err(|_| error_codes::INVALID_PARAMETER)?;
        let sender = self.connections.get(&connection_id).cloned().ok_or(error_codes::INVALID_PARAMETER)?;
        let (channel_pattern, channel_names) = self.registry.add_monitor(pattern, connection_id, sender);
        Ok(json!({ "result": true, "channelPattern": channel_pattern, "channelNames": channel_names }))
    }

    fn reply_ok(&mut self, connection_id: ConnectionId, header: &ReqHeader, value: Value) {
        self.reply(connection_id, header, error_codes::OK, value);
    }

    fn reply_error(&mut self, connection_id: ConnectionId, header: &ReqHeader, code: u8) {
        self.reply(connection_id, header, code, Value::Object(Default::default()));
    }

    fn reply(&mut self, connection_id: ConnectionId, header: &ReqHeader, code: u8, value: Value) {
        let res = Message::Res {
            header: ReqHeader {
                id: header.id,
                content_type: ContentType::Json,
                error: code,
                topic: header.topic.clone(),
                source: BROKER_CHANNEL_NAME.to_owned(),
                target: header.source.clone(),
            },
            payload: Payload::Json(value),
        };
        self.send_to_connection(connection_id, OutboundFrame::Message(res));
    }

    fn send_to_connection(&self, connection_id: ConnectionId, frame: OutboundFrame) {
        if let Some(sender) = self.connections.get(&connection_id) {
            let _ = sender.try_send(frame);
        }
    }

    fn send_all(&self, frames: Vec<(String, Message)>) {
        for (channel_name, message) in frames {
            if let Some(channel) = self.registry.get(&channel_name) {
                let _ = channel.sender.try_send(OutboundFrame::Message(message));
            }
        }
    }

    fn send_monitor_notifications(&self, notifications: Vec<MonitorNotification>) {
        for notification in notifications {
            let event = MonitorEvent {
                event: match notification.event {
                    MonitorEventKind::Register => WireMonitorEventKind::Register,
                    MonitorEventKind::Unregister => WireMonitorEventKind::Unregister,
                },
                channel: notification.channel,
            };
            let message = Message::Mon {
                header: MonHeader { id: self.queues.next_id(), content_type: ContentType::Json },
                payload: Payload::Json(serde_json::to_value(&event).expect("MonitorEvent always serializes")),
            };
            let _ = notification.sender.try_send(OutboundFrame::Message(message));
        }
    }
}

fn parse_pattern_kind(value: Option<&Value>) -> Result<PatternKind, u8> {
    match value.and_then(Value::as_str) {
        None | Some("glob") => Ok(PatternKind::Glob),
        Some("regexp") => Ok(PatternKind::Regexp),
        Some(_) => Err(error_codes::INVALID_PARAMETER),
    }
}

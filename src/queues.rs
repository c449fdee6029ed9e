//! Task Queues: per-topic pull (work queue) and subscribe (fan-out) queues.
//!
//! Both queue flavors keep members in insertion order, as required for pull
//! round-robin and for subscribe's "all current members, in registration
//! order is not itself significant but delivery order across pub calls is"
//! guarantee. Queues hold channel *names*, not `Channel` references — the
//! registry is the sole owner of channel state, so a queue that outlives its
//! member (briefly, between unregister and cascade) never observes stale data.

use std::collections::{HashMap, VecDeque};

use broker_wire::{ContentType, Message, Payload, PushHeader};

use crate::ids::IdGenerator;

struct InFlightItem {
    worker: String,
    source: String,
    topic: String,
    content_type: ContentType,
    payload: Payload,
}

struct PendingItem {
    source: String,
    content_type: ContentType,
    payload: Payload,
}

/// One `(pull, topic)` queue: round-robin dispatch with ack-tracked
/// in-flight items and redelivery on worker death.
#[derive(Default)]
struct PullQueue {
    members: Vec<String>,
    cursor: usize,
    in_flight: HashMap<u64, InFlightItem>,
    pending: VecDeque<PendingItem>,
}

impl PullQueue {
    fn add_member(&mut self, channel_name: &str) {
        if !self.members.iter().any(|m| m == channel_name) {
            self.members.push(channel_name.to_owned());
        }
    }

    /// Removes `channel_name` from the member list and returns any items
    /// that were in flight to it, so the caller can requeue them.
    fn remove_member(&mut self, channel_name: &str) -> Vec<PendingItem> {
        if let Some(pos) = self.members.iter().position(|m| m == channel_name) {
            self.members.remove(pos);
            if self.cursor > pos {
                self.cursor -= 1;
            }
        }
        let mut requeued = Vec::new();
        self.in_flight.retain(|_, item| {
            if item.worker == channel_name {
                requeued.push(PendingItem {
                    source: item.source.clone(),
                    content_type: item.content_type,
                    payload: item.payload.clone(),
                });
                false
            } else {
                true
            }
        });
        requeued
    }

    fn next_member(&mut self) -> Option<&str> {
        if self.members.is_empty() {
            return None;
        }
        let member = &self.members[self.cursor % self.members.len()];
        self.cursor = (self.cursor + 1) % self.members.len();
        Some(member)
    }

    /// Hands out as many pending items as there are available members,
    /// returning `(worker_channel, message)` pairs ready to send.
    fn dispatch(&mut self, topic: &str, ids: &IdGenerator) -> Vec<(String, Message)> {
        let mut out = Vec::new();
        while !self.members.is_empty() {
            let Some(item) = self.pending.pop_front() else { break };
            let worker = self.next_member().expect("members checked non-empty above").to_owned();
            let id = ids.next();
            let message = Message::Push {
                header: PushHeader {
                    id,
                    content_type: item.content_type,
                    topic: topic.to_owned(),
                    source: item.source.clone(),
                    target: worker.clone(),
                },
                items: vec![item.payload.clone()],
            };
            self.in_flight.insert(
                id,
                InFlightItem {
                    worker: worker.clone(),
                    source: item.source,
                    topic: topic.to_owned(),
                    content_type: item.content_type,
                    payload: item.payload,
                },
            );
            out.push((worker, message));
        }
        out
    }

    fn ack(&mut self, id: u64) -> bool {
        self.in_flight.remove(&id).is_some()
    }
}

/// One `(sub, topic)` queue: every current member gets every `pub`, no ack.
#[derive(Default)]
struct SubQueue {
    members: Vec<String>,
}

impl SubQueue {
    fn add_member(&mut self, channel_name: &str) {
        if !self.members.iter().any(|m| m == channel_name) {
            self.members.push(channel_name.to_owned());
        }
    }

    fn remove_member(&mut self, channel_name: &str) {
        self.members.retain(|m| m != channel_name);
    }
}

/// Owns every pull and subscribe queue, keyed by topic. Like the registry,
/// this lives entirely inside the single routing task.
#[derive(Default)]
pub struct QueueTable {
    pull: HashMap<String, PullQueue>,
    sub: HashMap<String, SubQueue>,
    ids: IdGenerator,
}

impl QueueTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pull_member(&mut self, topic: &str, channel_name: &str) -> Vec<(String, Message)> {
        let queue = self.pull.entry(topic.to_owned()).or_default();
        queue.add_member(channel_name);
        queue.dispatch(topic, &self.ids)
    }

    pub fn add_sub_member(&mut self, topic: &str, channel_name: &str) {
        self.sub.entry(topic.to_owned()).or_default().add_member(channel_name);
    }

    /// Removes `channel_name` from every pull and subscribe queue it
    /// belongs to. Any pull items that were in flight to it are re-enqueued
    /// and immediately redispatched to a surviving worker where possible.
    pub fn remove_member_everywhere(&mut self, channel_name: &str) -> Vec<(String, Message)> {
        let mut redelivered = Vec::new();
        for (topic, queue) in self.pull.iter_mut() {
            let requeued = queue.remove_member(channel_name);
            if requeued.is_empty() {
                continue;
            }
            for item in requeued {
                queue.pending.push_front(item);
            }
            redelivered.extend(queue.dispatch(topic, &self.ids));
        }
        for queue in self.sub.values_mut() {
            queue.remove_member(channel_name);
        }
        redelivered
    }

    /// Enqueues `items` onto the pull queue for `topic`, dispatching as many
    /// as currently-available workers allow; the rest wait at the queue head.
    pub fn enqueue_push(
        &mut self,
        topic: &str,
        source: &str,
        content_type: ContentType,
        items: Vec<Payload>,
    ) -> Vec<(String, Message)> {
        let queue = self.pull.entry(topic.to_owned()).or_default();
        for payload in items {
            queue.pending.push_back(PendingItem { source: source.to_owned(), content_type, payload });
        }
        queue.dispatch(topic, &self.ids)
    }

    pub fn ack(&mut self, topic: &str, id: u64) -> bool {
        self.pull.get_mut(topic).is_some_and(|q| q.ack(id))
    }

    pub fn sub_members(&self, topic: &str) -> &[String] {
        self.sub.get(topic).map_or(&[], |q| q.members.as_slice())
    }

    pub fn next_id(&self) -> u64 {
        self.ids.next()
    }
}

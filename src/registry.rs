//! Channel Registry: the broker's map of live channel names to their
//! outbound connections, response/pull/subscribe bindings, and monitors.
//!
//! Owned directly (no `RwLock`) by the single routing task described in
//! `SPEC_FULL.md` §5 — every method here runs to completion without
//! suspending, so no two calls ever interleave.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::connection::{ConnectionId, OutboundFrame};
use crate::error::RegistryError;
use crate::pattern::Pattern;

/// A registered channel: its outbound sink plus the topic bindings it
/// accepts traffic on. Non-owning with respect to the socket itself — the
/// Connection Lifecycle layer owns the socket; this just holds the handle
/// used to write to it.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub connection_id: ConnectionId,
    pub sender: tokio::sync::mpsc::Sender<OutboundFrame>,
    pub response_topics: std::collections::HashSet<String>,
    pub pull_topics: HashMap<String, Value>,
    pub subscribe_topics: HashMap<String, Value>,
}

struct Monitor {
    pattern: Pattern,
    observer: ConnectionId,
    sender: tokio::sync::mpsc::Sender<OutboundFrame>,
}

/// A channel register/unregister event a monitor's pattern matched, handed
/// back to the router so it can build and send the `mon` message — the
/// registry itself never talks the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventKind {
    Register,
    Unregister,
}

pub struct MonitorNotification {
    pub observer: ConnectionId,
    pub sender: tokio::sync::mpsc::Sender<OutboundFrame>,
    pub event: MonitorEventKind,
    pub channel: String,
}

#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
    channel_by_connection: HashMap<ConnectionId, String>,
    monitors: Vec<Monitor>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `requested_name`, substituting a generated id for every
    /// `#` until the result is unique, or generating a whole name if
    /// `requested_name` is empty. Returns the actual name assigned and any
    /// monitor notifications the registration triggered.
    pub fn register(
        &mut self,
        requested_name: &str,
        connection_id: ConnectionId,
        sender: tokio::sync::mpsc::Sender<OutboundFrame>,
    ) -> Result<(String, Vec<MonitorNotification>), RegistryError> {
        let name = self.resolve_name(requested_name);
        if self.channels.contains_key(&name) {
            return Err(RegistryError::RegisterFail(name));
        }

        self.channels.insert(
            name.clone(),
            Channel {
                name: name.clone(),
                connection_id,
                sender,
                response_topics: Default::default(),
                pull_topics: HashMap::new(),
                subscribe_topics: HashMap::new(),
            },
        );
        self.channel_by_connection.insert(connection_id, name.clone());

        let notifications = self.notify_monitors(MonitorEventKind::Register, &name);
        Ok((name, notifications))
    }

    /// Resolves a requested name into a concrete, not-yet-guaranteed-unique
    /// candidate. Empty names and `#`-bearing names get a fresh id; an
    /// already-taken candidate is retried with a new id until it is free.
    fn resolve_name(&self, requested_name: &str) -> String {
        if requested_name.is_empty() {
            return self.generate_unique(|id| id.clone());
        }
        if requested_name.contains('#') {
            return self.generate_unique(|id| requested_name.replace('#', id));
        }
        requested_name.to_owned()
    }

    fn generate_unique(&self, build: impl Fn(&String) -> String) -> String {
        loop {
            let id = Uuid::new_v4().simple().to_string();
            let candidate = build(&id);
            if !self.channels.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn add_response(&mut self, channel_name: &str, topic: &str) -> bool {
        match self.channels.get_mut(channel_name) {
            Some(channel) => {
                channel.response_topics.insert(topic.to_owned());
                true
            }
            None => false,
        }
    }

    pub fn add_pull(&mut self, channel_name: &str, topic: &str, options: Value) -> bool {
        match self.channels.get_mut(channel_name) {
            Some(channel) => {
                channel.pull_topics.insert(topic.to_owned(), options);
                true
            }
            None => false,
        }
    }

    pub fn add_subscribe(&mut self, channel_name: &str, topic: &str, options: Value) -> bool {
        match self.channels.get_mut(channel_name) {
            Some(channel) => {
                channel.subscribe_topics.insert(topic.to_owned(), options);
                true
            }
            None => false,
        }
    }

    /// If `target_name` is live and accepts `topic` as a response, returns
    /// it. Otherwise falls back to a broker-wide search, used when a client
    /// directs a `req` at the broker itself.
    pub fn find_response_topic(&self, target_name: &str, topic: &str) -> Option<&Channel> {
        if let Some(channel) = self.channels.get(target_name) {
            if channel.response_topics.contains(topic) {
                return Some(channel);
            }
        }
        self.channels.values().find(|c| c.response_topics.contains(topic))
    }

    pub fn get(&self, channel_name: &str) -> Option<&Channel> {
        self.channels.get(channel_name)
    }

    pub fn channel_name_for_connection(&self, connection_id: ConnectionId) -> Option<&str> {
        self.channel_by_connection.get(&connection_id).map(String::as_str)
    }

    pub fn find_channel_names(&self, pattern: &Pattern) -> Vec<String> {
        let mut names: Vec<String> =
            self.channels.keys().filter(|name| pattern.is_match(name)).cloned().collect();
        names.sort();
        names
    }

    /// Registers an observer for future register/unregister events matching
    /// `pattern`, returning the pattern and the channels that already match.
    pub fn add_monitor(
        &mut self,
        pattern: Pattern,
        observer: ConnectionId,
        sender: tokio::sync::mpsc::Sender<OutboundFrame>,
    ) -> (String, Vec<String>) {
        let matches = self.find_channel_names(&pattern);
        let source = pattern.source().to_owned();
        self.monitors.push(Monitor { pattern, observer, sender });
        (source, matches)
    }

    /// Removes the channel owned by `connection_id`, if any, and returns the
    /// removed channel plus any monitor notifications the removal triggered.
    /// Also drops any monitors `connection_id` itself registered — a dead
    /// observer cannot watch anything.
    pub fn unregister_by_connection(
        &mut self,
        connection_id: ConnectionId,
    ) -> (Option<Channel>, Vec<MonitorNotification>) {
        self.monitors.retain(|m| m.observer != connection_id);

        let Some(name) = self.channel_by_connection.remove(&connection_id) else {
            return (None, Vec::new());
        };
        let channel = self.channels.remove(&name);
        let notifications = self.notify_monitors(MonitorEventKind::Unregister, &name);
        (channel, notifications)
    }

    fn notify_monitors(&self, event: MonitorEventKind, channel_name: &str) -> Vec<MonitorNotification> {
        self.monitors
            .iter()
            .filter(|m| m.pattern.is_match(channel_name))
            .map(|m| MonitorNotification {
                observer: m.observer,
                sender: m.sender.clone(),
                event,
                channel: channel_name.to_owned(),
            })
            .collect()
    }
}

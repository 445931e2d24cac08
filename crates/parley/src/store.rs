// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory, append-only message store.
//!
//! Message ids are a pure function of sender, text, and the minute bucket of
//! the timestamp, using the JVM `String.hashCode` so ids agree with the ones
//! other clients and the offline-message feed produce. Two sends of the same
//! text by the same sender within one minute share an id; that collision is
//! what identifies a resend.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use crate::event::StoreEvent;

const MINUTE_MS: i64 = 60_000;

/// Sender name used for pushed group messages (the wire does not carry one).
pub const UNKNOWN_SENDER: &str = "Unknown";

/// JVM `String.hashCode`: 31-polynomial over UTF-16 code units, wrapping.
pub fn java_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn minute_bucket(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(MINUTE_MS)
}

/// Id for a direct message: `hash(senderId ++ hash(text) ++ minute)`.
pub fn direct_message_id(sender_id: i64, text: &str, timestamp_ms: i64) -> String {
    let seed = format!("{sender_id}{}{}", java_hash(text), minute_bucket(timestamp_ms));
    java_hash(&seed).to_string()
}

/// Id for a group message: `hash(groupId ++ senderId ++ hash(text) ++ minute)`.
pub fn group_message_id(group_id: i64, sender_id: i64, text: &str, timestamp_ms: i64) -> String {
    let seed =
        format!("{group_id}{sender_id}{}{}", java_hash(text), minute_bucket(timestamp_ms));
    java_hash(&seed).to_string()
}

/// Observable delivery flag shared by every clone of a message.
#[derive(Clone)]
pub struct SentFlag(Arc<watch::Sender<bool>>);

impl SentFlag {
    pub fn new(sent: bool) -> Self {
        let (tx, _) = watch::channel(sent);
        Self(Arc::new(tx))
    }

    pub fn get(&self) -> bool {
        *self.0.borrow()
    }

    pub fn set(&self, sent: bool) {
        self.0.send_replace(sent);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

impl fmt::Debug for SentFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SentFlag").field(&self.get()).finish()
    }
}

/// A direct message.
#[derive(Debug, Clone)]
pub struct Message {
    /// The peer for outbound copies, the author for inbound ones.
    pub sender_id: i64,
    pub text: String,
    /// True when this client wrote the message.
    pub sender: bool,
    pub timestamp: i64,
    pub is_sent: SentFlag,
    pub message_id: String,
}

impl Message {
    /// Build a message, deriving the id when `message_id` is `None` or empty.
    pub fn new(
        sender_id: i64,
        text: impl Into<String>,
        sender: bool,
        timestamp: i64,
        is_sent: bool,
        message_id: Option<String>,
    ) -> Self {
        let text = text.into();
        let message_id = message_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| direct_message_id(sender_id, &text, timestamp));
        Self { sender_id, text, sender, timestamp, is_sent: SentFlag::new(is_sent), message_id }
    }

    /// A message received from a peer.
    pub fn incoming(sender_id: i64, text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(sender_id, text, false, timestamp, true, None)
    }

    /// Local, not-yet-acknowledged copy of an outbound message.
    pub fn outgoing(peer_id: i64, text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(peer_id, text, true, timestamp, false, None)
    }
}

/// A group message.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub group_id: i64,
    pub sender_name: String,
    pub text: String,
    pub sender_id: i64,
    pub timestamp: i64,
    pub is_sent: SentFlag,
    pub message_id: String,
}

impl GroupMessage {
    pub fn new(
        group_id: i64,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        sender_id: i64,
        timestamp: i64,
        is_sent: bool,
        message_id: Option<String>,
    ) -> Self {
        let text = text.into();
        let message_id = message_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| group_message_id(group_id, sender_id, &text, timestamp));
        Self {
            group_id,
            sender_name: sender_name.into(),
            text,
            sender_id,
            timestamp,
            is_sent: SentFlag::new(is_sent),
            message_id,
        }
    }
}

/// Append-only collections of direct and group messages.
pub struct MessageStore {
    direct: RwLock<Vec<Message>>,
    group: RwLock<Vec<GroupMessage>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self { direct: RwLock::new(Vec::new()), group: RwLock::new(Vec::new()), events }
    }

    pub fn append(&self, message: Message) {
        self.direct.write().push(message.clone());
        // No subscribers is fine.
        let _ = self.events.send(StoreEvent::DirectAppended(message));
    }

    pub fn append_group(&self, message: GroupMessage) {
        self.group.write().push(message.clone());
        let _ = self.events.send(StoreEvent::GroupAppended(message));
    }

    /// Bulk-append direct messages (offline backlog).
    pub fn extend_direct(&self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    pub fn direct(&self) -> Vec<Message> {
        self.direct.read().clone()
    }

    pub fn group(&self) -> Vec<GroupMessage> {
        self.group.read().clone()
    }

    /// Direct messages exchanged with one peer, in append order.
    pub fn conversation(&self, peer_id: i64) -> Vec<Message> {
        self.direct.read().iter().filter(|m| m.sender_id == peer_id).cloned().collect()
    }

    pub fn group_conversation(&self, group_id: i64) -> Vec<GroupMessage> {
        self.group.read().iter().filter(|m| m.group_id == group_id).cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

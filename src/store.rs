//! src/store.rs
//!
//! The history store: an insert-only, idempotent collection
//! of every message this node has ever observed, keyed by `message_id`.

use crate::codec::Message;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HistoryStore {
    messages: HashMap<String, Message>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, message_id: &str) -> bool {
        self.messages.contains_key(message_id)
    }

    /// Idempotent: re-inserting an id already present is a no-op. Returns
    /// `true` if this call actually added a new message.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.messages.contains_key(&message.message_id) {
            return false;
        }
        self.messages.insert(message.message_id.clone(), message);
        true
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id)
    }

    pub fn enumerate(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Every stored message whose sequence number exceeds what `remote_clock`
    /// reports for its origin. Ordered by `(origin, sequence_number)` for
    /// reproducibility, though the contract leaves ordering unspecified.
    pub fn missing_for(&self, remote_clock: &HashMap<String, u64>) -> Vec<Message> {
        let mut missing: Vec<Message> = self
            .messages
            .values()
            .filter(|m| m.sequence_number > remote_clock.get(&m.origin).copied().unwrap_or(0))
            .cloned()
            .collect();
        missing.sort_by(|a, b| (a.origin.as_str(), a.sequence_number).cmp(&(b.origin.as_str(), b.sequence_number)));
        missing
    }
}

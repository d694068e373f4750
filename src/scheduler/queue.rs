//! Priority queue of pending messages: priority descending, then arrival.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::context::MessageId;

type QueueKey = (Reverse<i32>, u64);

#[derive(Debug, Default)]
pub struct MessageQueue {
    order: BTreeMap<QueueKey, MessageId>,
    keys: HashMap<MessageId, QueueKey>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// `seq` must be unique and increase with arrival.
    pub fn push(&mut self, id: MessageId, priority: i32, seq: u64) {
        let key = (Reverse(priority), seq);
        if let Some(old) = self.keys.insert(id, key) {
            self.order.remove(&old);
        }
        self.order.insert(key, id);
    }

    pub fn remove(&mut self, id: &MessageId) -> bool {
        match self.keys.remove(id) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Highest priority, earliest arrival.
    pub fn head(&self) -> Option<MessageId> {
        self.order.values().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.order.values().copied()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

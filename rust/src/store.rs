use std::collections::HashSet;

use crate::state::{ChatMessage, MessageDeliveryState};

/// Ordered, id-deduplicated message list for one open conversation.
///
/// The poll loop and the push socket race freely; this store is the single
/// merge point, so the redundancy between the two channels stays a safety net
/// instead of duplicated logic. Ordering is best effort: ascending by
/// `created_at_ms` with a stable sort, so equal or missing timestamps keep
/// arrival order. There are no sequence numbers — two-party chat does not
/// need linearizable ordering, and the backend provides none.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append at the end; a message whose id is already present is dropped,
    /// which is what makes dual-channel delivery safe.
    pub fn append(&mut self, message: ChatMessage) {
        if self.ids.contains(&message.id) {
            return;
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
    }

    /// Swap a locally-created pending entry for its server-acknowledged form,
    /// keeping its position in the sequence. If the acknowledged id already
    /// arrived through another channel the stale temp entry is removed
    /// instead of duplicating the message.
    pub fn replace(&mut self, temp_id: &str, final_message: ChatMessage) {
        let Some(idx) = self.messages.iter().position(|m| m.id == temp_id) else {
            self.append(final_message);
            return;
        };
        if final_message.id != temp_id && self.ids.contains(&final_message.id) {
            self.ids.remove(temp_id);
            self.messages.remove(idx);
            return;
        }
        self.ids.remove(temp_id);
        self.ids.insert(final_message.id.clone());
        self.messages[idx] = final_message;
    }

    /// In-place transition of a pending entry to Failed. The entry is never
    /// removed; the user must be able to see and retry it.
    pub fn mark_failed(&mut self, temp_id: &str, reason: impl Into<String>) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == temp_id) {
            msg.delivery = MessageDeliveryState::Failed {
                reason: reason.into(),
            };
        }
    }

    /// Reconcile a freshly polled history snapshot.
    ///
    /// A snapshot strictly longer than the store is taken as authoritative
    /// and adopted wholesale — except that unacknowledged local entries
    /// (pending or failed) absent from it are carried over, so an in-flight
    /// send is never wiped out by a poll cycle. Otherwise only snapshot
    /// messages absent locally are appended.
    pub fn merge_snapshot(&mut self, snapshot: Vec<ChatMessage>) {
        if snapshot.len() > self.messages.len() {
            let unacked: Vec<ChatMessage> = self
                .messages
                .drain(..)
                .filter(|m| !matches!(m.delivery, MessageDeliveryState::Sent))
                .collect();
            self.ids.clear();
            for msg in snapshot {
                self.append(msg);
            }
            for msg in unacked {
                self.append(msg);
            }
        } else {
            for msg in snapshot {
                self.append(msg);
            }
        }
        // Stable: equal or missing timestamps keep their current order,
        // missing ones gathering at the tail.
        self.messages
            .sort_by_key(|m| m.created_at_ms.unwrap_or(i64::MAX));
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cove_types::models::{Message, Reaction};

/// Ordered, id-deduplicated collection of one room's messages.
///
/// An id-indexed map alongside an order vector keeps dedup and removal O(log n)
/// under event load instead of a linear scan per feed event. The snapshot is
/// always ascending by `(created_at, id)`; timestamps come from the
/// authoritative write path, so the ordering is stable regardless of the
/// arrival order of events. A reaction-id index resolves feed reaction deletes,
/// which carry only the old row's primary key.
#[derive(Debug, Default)]
pub struct MessageStore {
    by_id: HashMap<Uuid, Message>,
    /// Message ids, ascending by `(created_at, id)`.
    order: Vec<Uuid>,
    /// reaction id -> message id
    reaction_index: HashMap<Uuid, Uuid>,
    /// Ids removed locally or via the feed. A delete can land while the
    /// matching insert is still resolving its author name; the tombstone
    /// keeps that late insert from resurrecting the message.
    tombstones: HashSet<Uuid>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.by_id.get(&id)
    }

    /// Idempotent insert: a message whose id is already present, or already
    /// tombstoned by a removal, is a no-op. Returns whether the message was
    /// actually added.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.by_id.contains_key(&message.id) || self.tombstones.contains(&message.id) {
            return false;
        }
        let key = (message.created_at, message.id);
        let pos = self
            .order
            .binary_search_by(|probe| self.sort_key(*probe).cmp(&key))
            .unwrap_or_else(|pos| pos);
        self.order.insert(pos, message.id);
        for r in &message.reactions {
            self.reaction_index.insert(r.id, message.id);
        }
        self.by_id.insert(message.id, message);
        true
    }

    /// Idempotent removal: removing an absent id is a no-op, never an error.
    /// The id is tombstoned either way. Returns whether a message was
    /// actually removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        self.tombstones.insert(id);
        let Some(message) = self.by_id.remove(&id) else {
            return false;
        };
        if let Some(pos) = self.order.iter().position(|m| *m == id) {
            self.order.remove(pos);
        }
        for r in &message.reactions {
            self.reaction_index.remove(&r.id);
        }
        true
    }

    /// Discards all local state in favor of an authoritative reload.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.by_id.clear();
        self.order.clear();
        self.reaction_index.clear();
        self.tombstones.clear();
        for message in messages {
            self.insert(message);
        }
    }

    /// Messages in ascending `(created_at, id)` order.
    pub fn snapshot(&self) -> impl Iterator<Item = &Message> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    // -- Reactions --

    /// Idempotent by reaction id; dropped when the target message is absent
    /// (it may have been deleted between commit and delivery).
    pub fn add_reaction(&mut self, reaction: Reaction) -> bool {
        if self.reaction_index.contains_key(&reaction.id) {
            return false;
        }
        let Some(message) = self.by_id.get_mut(&reaction.message_id) else {
            return false;
        };
        self.reaction_index.insert(reaction.id, reaction.message_id);
        message.reactions.push(reaction);
        true
    }

    /// Removes a reaction wherever it lives, returning it for rollback use.
    pub fn remove_reaction(&mut self, reaction_id: Uuid) -> Option<Reaction> {
        let message_id = self.reaction_index.remove(&reaction_id)?;
        let message = self.by_id.get_mut(&message_id)?;
        let pos = message.reactions.iter().position(|r| r.id == reaction_id)?;
        Some(message.reactions.remove(pos))
    }

    /// Swaps a pending placeholder for its authoritative record. If the
    /// authoritative row already landed through the feed, the placeholder is
    /// simply dropped, never duplicated.
    pub fn replace_reaction(&mut self, placeholder_id: Uuid, authoritative: Reaction) {
        let Some(message_id) = self.reaction_index.remove(&placeholder_id) else {
            return;
        };
        let Some(message) = self.by_id.get_mut(&message_id) else {
            return;
        };
        message.reactions.retain(|r| r.id != placeholder_id);
        if !self.reaction_index.contains_key(&authoritative.id) {
            self.reaction_index.insert(authoritative.id, message_id);
            message.reactions.push(authoritative);
        }
    }

    pub fn find_reaction(&self, message_id: Uuid, author_id: Uuid, emoji: &str) -> Option<&Reaction> {
        self.by_id
            .get(&message_id)?
            .reactions
            .iter()
            .find(|r| r.author_id == author_id && r.emoji == emoji)
    }

    fn sort_key(&self, id: Uuid) -> (DateTime<Utc>, Uuid) {
        match self.by_id.get(&id) {
            Some(m) => (m.created_at, m.id),
            // Unreachable while order and by_id stay in sync.
            None => (DateTime::<Utc>::MIN_UTC, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: u128, at_secs: i64) -> Message {
        Message {
            id: Uuid::from_u128(id),
            room_id: Uuid::from_u128(7),
            author_id: Uuid::from_u128(100),
            author_name: "ada".into(),
            content: Some(format!("m{id}")),
            attachment_url: None,
            created_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
            reactions: vec![],
        }
    }

    fn reaction(id: u128, message_id: u128, author_id: u128, emoji: &str) -> Reaction {
        Reaction {
            id: Uuid::from_u128(id),
            message_id: Uuid::from_u128(message_id),
            author_id: Uuid::from_u128(author_id),
            emoji: emoji.into(),
        }
    }

    #[test]
    fn insert_is_idempotent_by_id() {
        let mut store = MessageStore::new();
        assert!(store.insert(message(1, 10)));
        assert!(!store.insert(message(1, 10)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_absent_id_is_a_noop() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        assert!(!store.remove(Uuid::from_u128(99)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_orders_by_timestamp_regardless_of_arrival() {
        let mut store = MessageStore::new();
        store.insert(message(3, 30));
        store.insert(message(1, 10));
        store.insert(message(2, 20));
        let ids: Vec<Uuid> = store.snapshot().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
        );
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let mut store = MessageStore::new();
        store.insert(message(2, 10));
        store.insert(message(1, 10));
        let ids: Vec<Uuid> = store.snapshot().map(|m| m.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
    }

    #[test]
    fn add_reaction_is_idempotent_by_id() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        assert!(store.add_reaction(reaction(50, 1, 100, "👍")));
        assert!(!store.add_reaction(reaction(50, 1, 100, "👍")));
        assert_eq!(store.get(Uuid::from_u128(1)).unwrap().reactions.len(), 1);
    }

    #[test]
    fn reaction_for_absent_message_is_dropped() {
        let mut store = MessageStore::new();
        assert!(!store.add_reaction(reaction(50, 1, 100, "👍")));
    }

    #[test]
    fn remove_reaction_resolves_through_the_index() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        store.add_reaction(reaction(50, 1, 100, "👍"));
        let removed = store.remove_reaction(Uuid::from_u128(50)).unwrap();
        assert_eq!(removed.emoji, "👍");
        assert!(store.remove_reaction(Uuid::from_u128(50)).is_none());
        assert!(store.get(Uuid::from_u128(1)).unwrap().reactions.is_empty());
    }

    #[test]
    fn replace_reaction_drops_placeholder_when_echo_arrived_first() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        store.add_reaction(reaction(50, 1, 100, "👍")); // placeholder
        store.add_reaction(reaction(501, 1, 100, "👍")); // feed echo won the race
        store.replace_reaction(Uuid::from_u128(50), reaction(501, 1, 100, "👍"));
        let reactions = &store.get(Uuid::from_u128(1)).unwrap().reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].id, Uuid::from_u128(501));
    }

    #[test]
    fn removing_a_message_purges_its_reaction_index_entries() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        store.add_reaction(reaction(50, 1, 100, "👍"));
        store.remove(Uuid::from_u128(1));
        assert!(store.remove_reaction(Uuid::from_u128(50)).is_none());
    }

    #[test]
    fn delete_racing_a_slow_insert_does_not_resurrect_the_message() {
        let mut store = MessageStore::new();
        // The delete event lands before the insert finishes resolving.
        store.remove(Uuid::from_u128(1));
        assert!(!store.insert(message(1, 10)));
        assert!(store.is_empty());
    }

    #[test]
    fn replace_all_clears_tombstones() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        store.remove(Uuid::from_u128(1));
        store.replace_all(vec![message(1, 10)]);
        assert!(store.contains(Uuid::from_u128(1)));
    }

    #[test]
    fn replace_all_rebuilds_order_and_index() {
        let mut store = MessageStore::new();
        store.insert(message(1, 10));
        let mut fresh = message(2, 5);
        fresh.reactions.push(reaction(60, 2, 100, "🎉"));
        store.replace_all(vec![message(3, 30), fresh]);
        let ids: Vec<Uuid> = store.snapshot().map(|m| m.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);
        assert!(store.remove_reaction(Uuid::from_u128(60)).is_some());
    }
}

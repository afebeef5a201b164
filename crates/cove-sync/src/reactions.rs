use std::collections::HashMap;

use uuid::Uuid;

use cove_types::api::{NewReaction, ReactionGroup};
use cove_types::models::{Message, Reaction};

use crate::store::MessageStore;

/// Opaque handle tying an in-flight remote reaction write back to the exact
/// optimistic change it must reconcile. Acknowledgments may resolve in any
/// order, so reconciliation is keyed by token, never by issue order or by
/// "first reaction matching emoji + author".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpToken(Uuid);

impl OpToken {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug)]
enum PendingOp {
    Insert {
        placeholder_id: Uuid,
        /// Set when a second toggle removed the placeholder before the insert
        /// acknowledged. The eventual authoritative row is then surplus and
        /// must be deleted remotely instead of applied.
        cancelled: bool,
    },
    Remove {
        removed: Reaction,
    },
}

/// The remote write a toggle decided on. `None` from [`ReactionAggregator::toggle`]
/// means the optimistic change (if any) needs no remote call.
#[derive(Debug)]
pub enum ToggleAction {
    Insert { token: OpToken, request: NewReaction },
    Remove { token: OpToken, reaction_id: Uuid },
}

/// What a confirmed reaction insert reconciled to.
#[derive(Debug)]
pub enum InsertOutcome {
    Applied,
    /// The placeholder was toggled away while the write was in flight; the
    /// authoritative row is an orphan the caller should delete remotely.
    Orphaned(Reaction),
    /// Late or duplicate acknowledgment; nothing to do.
    Stale,
}

/// Toggle semantics over the message store's reaction sets, with a
/// pending-operation table so concurrent toggles on the same message stay
/// individually addressable.
#[derive(Debug, Default)]
pub struct ReactionAggregator {
    pending: HashMap<OpToken, PendingOp>,
}

impl ReactionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the optimistic half of a toggle and reports the remote write
    /// to issue, if any.
    pub fn toggle(
        &mut self,
        store: &mut MessageStore,
        message_id: Uuid,
        emoji: &str,
        local_identity: Uuid,
    ) -> Option<ToggleAction> {
        if let Some(existing) = store.find_reaction(message_id, local_identity, emoji).cloned() {
            // If the existing reaction is itself a pending placeholder, the
            // remote row does not exist yet; cancel the pending insert rather
            // than issuing a delete for an id the backend never saw.
            if let Some(op) = self.pending_insert_for(existing.id) {
                if let PendingOp::Insert { cancelled, .. } = op {
                    *cancelled = true;
                }
                store.remove_reaction(existing.id);
                return None;
            }

            store.remove_reaction(existing.id);
            let token = OpToken::new();
            self.pending.insert(token, PendingOp::Remove { removed: existing.clone() });
            return Some(ToggleAction::Remove {
                token,
                reaction_id: existing.id,
            });
        }

        let placeholder = Reaction {
            id: Uuid::new_v4(),
            message_id,
            author_id: local_identity,
            emoji: emoji.to_string(),
        };
        // Message may have been deleted between render and toggle.
        if !store.add_reaction(placeholder.clone()) {
            return None;
        }
        let token = OpToken::new();
        self.pending.insert(
            token,
            PendingOp::Insert {
                placeholder_id: placeholder.id,
                cancelled: false,
            },
        );
        Some(ToggleAction::Insert {
            token,
            request: NewReaction {
                message_id,
                author_id: local_identity,
                emoji: emoji.to_string(),
            },
        })
    }

    /// Reconciles a confirmed insert: the placeholder recorded for `token` is
    /// swapped for the authoritative record.
    pub fn commit_insert(
        &mut self,
        store: &mut MessageStore,
        token: OpToken,
        authoritative: Reaction,
    ) -> InsertOutcome {
        match self.pending.remove(&token) {
            Some(PendingOp::Insert { cancelled: true, .. }) => {
                InsertOutcome::Orphaned(authoritative)
            }
            Some(PendingOp::Insert { placeholder_id, .. }) => {
                store.replace_reaction(placeholder_id, authoritative);
                InsertOutcome::Applied
            }
            _ => InsertOutcome::Stale,
        }
    }

    /// Rolls back a failed insert by removing its placeholder.
    pub fn abort_insert(&mut self, store: &mut MessageStore, token: OpToken) {
        if let Some(PendingOp::Insert { placeholder_id, cancelled }) = self.pending.remove(&token) {
            if !cancelled {
                store.remove_reaction(placeholder_id);
            }
        }
    }

    pub fn commit_remove(&mut self, token: OpToken) {
        self.pending.remove(&token);
    }

    /// Rolls back a failed remove by re-adding the removed reaction.
    pub fn abort_remove(&mut self, store: &mut MessageStore, token: OpToken) {
        if let Some(PendingOp::Remove { removed }) = self.pending.remove(&token) {
            store.add_reaction(removed);
        }
    }

    /// Forgets every in-flight operation. Used by the full-reload path; late
    /// acknowledgments for forgotten tokens reconcile as stale no-ops.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Groups one message's live reaction set by emoji for display. Recomputed
    /// on every view rebuild, never cached.
    pub fn group(message: &Message, local_identity: Uuid) -> Vec<ReactionGroup> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, ReactionGroup> = HashMap::new();
        for r in &message.reactions {
            let entry = groups.entry(r.emoji.as_str()).or_insert_with(|| {
                order.push(r.emoji.as_str());
                ReactionGroup {
                    emoji: r.emoji.clone(),
                    count: 0,
                    reacted: false,
                }
            });
            entry.count += 1;
            if r.author_id == local_identity {
                entry.reacted = true;
            }
        }
        order
            .into_iter()
            .filter_map(|emoji| groups.remove(emoji))
            .collect()
    }

    fn pending_insert_for(&mut self, placeholder: Uuid) -> Option<&mut PendingOp> {
        self.pending.values_mut().find(|op| {
            matches!(op, PendingOp::Insert { placeholder_id, .. } if *placeholder_id == placeholder)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cove_types::models::Message;

    const LOCAL: Uuid = Uuid::from_u128(100);
    const OTHER: Uuid = Uuid::from_u128(200);
    const MSG: Uuid = Uuid::from_u128(42);

    fn store_with_message() -> MessageStore {
        let mut store = MessageStore::new();
        store.insert(Message {
            id: MSG,
            room_id: Uuid::from_u128(7),
            author_id: OTHER,
            author_name: "bea".into(),
            content: Some("hi".into()),
            attachment_url: None,
            created_at: Utc.timestamp_opt(10, 0).unwrap(),
            reactions: vec![],
        });
        store
    }

    fn authoritative(id: u128, emoji: &str) -> Reaction {
        Reaction {
            id: Uuid::from_u128(id),
            message_id: MSG,
            author_id: LOCAL,
            emoji: emoji.into(),
        }
    }

    #[test]
    fn toggle_on_adds_placeholder_and_commit_swaps_it() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let action = agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap();
        let ToggleAction::Insert { token, request } = action else {
            panic!("expected insert");
        };
        assert_eq!(request.emoji, "👍");
        assert_eq!(store.get(MSG).unwrap().reactions.len(), 1);

        let outcome = agg.commit_insert(&mut store, token, authoritative(501, "👍"));
        assert!(matches!(outcome, InsertOutcome::Applied));
        let reactions = &store.get(MSG).unwrap().reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].id, Uuid::from_u128(501));
    }

    #[test]
    fn toggle_off_stashes_reaction_and_rolls_back_on_failure() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();
        store.add_reaction(authoritative(501, "👍"));

        let action = agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap();
        let ToggleAction::Remove { token, reaction_id } = action else {
            panic!("expected remove");
        };
        assert_eq!(reaction_id, Uuid::from_u128(501));
        assert!(store.get(MSG).unwrap().reactions.is_empty());

        agg.abort_remove(&mut store, token);
        assert_eq!(store.get(MSG).unwrap().reactions.len(), 1);
    }

    #[test]
    fn failed_insert_removes_the_placeholder() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let ToggleAction::Insert { token, .. } = agg.toggle(&mut store, MSG, "🎉", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };
        agg.abort_insert(&mut store, token);
        assert!(store.get(MSG).unwrap().reactions.is_empty());
    }

    #[test]
    fn double_toggle_before_ack_cancels_and_orphans_the_confirmed_row() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let ToggleAction::Insert { token, .. } = agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };
        // Second toggle lands before the insert acknowledges: no remote call,
        // the placeholder just goes away.
        assert!(agg.toggle(&mut store, MSG, "👍", LOCAL).is_none());
        assert!(store.get(MSG).unwrap().reactions.is_empty());

        // The late acknowledgment surfaces the server row for remote cleanup.
        let outcome = agg.commit_insert(&mut store, token, authoritative(501, "👍"));
        let InsertOutcome::Orphaned(orphan) = outcome else {
            panic!("expected orphan");
        };
        assert_eq!(orphan.id, Uuid::from_u128(501));
        assert!(store.get(MSG).unwrap().reactions.is_empty());
    }

    #[test]
    fn commit_tolerates_feed_echo_arriving_before_the_ack() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let ToggleAction::Insert { token, .. } = agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };
        // Authoritative row arrives through the feed first.
        store.add_reaction(authoritative(501, "👍"));

        agg.commit_insert(&mut store, token, authoritative(501, "👍"));
        let reactions = &store.get(MSG).unwrap().reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].id, Uuid::from_u128(501));
    }

    #[test]
    fn concurrent_toggles_on_different_emoji_stay_addressable() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let ToggleAction::Insert { token: up, .. } =
            agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };
        let ToggleAction::Insert { token: party, .. } =
            agg.toggle(&mut store, MSG, "🎉", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };

        // Acks resolve in reverse issue order.
        agg.commit_insert(&mut store, party, authoritative(502, "🎉"));
        agg.commit_insert(&mut store, up, authoritative(501, "👍"));

        let groups = ReactionAggregator::group(store.get(MSG).unwrap(), LOCAL);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.count == 1 && g.reacted));
    }

    #[test]
    fn stale_ack_after_clear_pending_is_a_noop() {
        let mut store = store_with_message();
        let mut agg = ReactionAggregator::new();

        let ToggleAction::Insert { token, .. } = agg.toggle(&mut store, MSG, "👍", LOCAL).unwrap()
        else {
            panic!("expected insert");
        };
        agg.clear_pending();
        store.replace_all(vec![]);

        let outcome = agg.commit_insert(&mut store, token, authoritative(501, "👍"));
        assert!(matches!(outcome, InsertOutcome::Stale));
    }

    #[test]
    fn grouping_counts_per_emoji_and_flags_local_identity() {
        let mut store = store_with_message();
        store.add_reaction(authoritative(501, "👍"));
        store.add_reaction(Reaction {
            id: Uuid::from_u128(502),
            message_id: MSG,
            author_id: OTHER,
            emoji: "👍".into(),
        });
        store.add_reaction(Reaction {
            id: Uuid::from_u128(503),
            message_id: MSG,
            author_id: OTHER,
            emoji: "🎉".into(),
        });

        let groups = ReactionAggregator::group(store.get(MSG).unwrap(), LOCAL);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].emoji, "👍");
        assert_eq!(groups[0].count, 2);
        assert!(groups[0].reacted);
        assert_eq!(groups[1].emoji, "🎉");
        assert_eq!(groups[1].count, 1);
        assert!(!groups[1].reacted);
    }
}

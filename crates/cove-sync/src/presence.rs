use std::collections::HashMap;

use uuid::Uuid;

use cove_types::models::{PresenceRecord, PresenceStatus};

/// Last-wins map of per-identity presence records for one room's channel.
///
/// A sync event fully replaces prior knowledge; there is no incremental
/// patching and no history. Staleness between syncs is accepted; there is
/// no heartbeat in this design.
#[derive(Debug)]
pub struct PresenceTracker {
    local_identity: Uuid,
    state: HashMap<Uuid, PresenceRecord>,
}

impl PresenceTracker {
    pub fn new(local_identity: Uuid) -> Self {
        Self {
            local_identity,
            state: HashMap::new(),
        }
    }

    /// Replaces the tracked state with the channel's full snapshot.
    pub fn apply_sync(&mut self, snapshot: HashMap<Uuid, PresenceRecord>) {
        self.state = snapshot;
    }

    /// Display names of other identities whose latest record is Typing,
    /// sorted for stable rendering. The local identity is always excluded.
    pub fn typing_users(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .iter()
            .filter(|(id, record)| {
                **id != self.local_identity && record.status == PresenceStatus::Typing
            })
            .map(|(_, record)| record.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: Uuid = Uuid::from_u128(1);

    fn record(name: &str, status: PresenceStatus) -> PresenceRecord {
        PresenceRecord {
            name: name.into(),
            status,
        }
    }

    #[test]
    fn typing_set_excludes_local_identity() {
        let mut tracker = PresenceTracker::new(LOCAL);
        tracker.apply_sync(HashMap::from([
            (LOCAL, record("me", PresenceStatus::Typing)),
            (Uuid::from_u128(2), record("bea", PresenceStatus::Typing)),
            (Uuid::from_u128(3), record("cal", PresenceStatus::Online)),
        ]));
        assert_eq!(tracker.typing_users(), vec!["bea".to_string()]);
    }

    #[test]
    fn sync_fully_replaces_prior_knowledge() {
        let mut tracker = PresenceTracker::new(LOCAL);
        tracker.apply_sync(HashMap::from([(
            Uuid::from_u128(2),
            record("bea", PresenceStatus::Typing),
        )]));
        assert_eq!(tracker.typing_users().len(), 1);

        // bea left the snapshot entirely; no residue from the previous sync.
        tracker.apply_sync(HashMap::from([(
            Uuid::from_u128(3),
            record("cal", PresenceStatus::Typing),
        )]));
        assert_eq!(tracker.typing_users(), vec!["cal".to_string()]);
    }

    #[test]
    fn empty_snapshot_clears_the_typing_set() {
        let mut tracker = PresenceTracker::new(LOCAL);
        tracker.apply_sync(HashMap::from([(
            Uuid::from_u128(2),
            record("bea", PresenceStatus::Typing),
        )]));
        tracker.apply_sync(HashMap::new());
        assert!(tracker.typing_users().is_empty());
    }
}

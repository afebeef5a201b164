use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use cove_types::events::{ChannelEvent, FeedEvent};
use cove_types::models::PresenceRecord;

/// Per-room broadcast hub: one channel carrying both the change feed and the
/// presence snapshots. Presence mutations rebroadcast the full state, never
/// a diff.
pub(crate) struct FeedHub {
    rooms: Mutex<HashMap<Uuid, RoomHub>>,
}

struct RoomHub {
    tx: broadcast::Sender<ChannelEvent>,
    presence: HashMap<Uuid, PresenceRecord>,
}

impl RoomHub {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            presence: HashMap::new(),
        }
    }
}

impl FeedHub {
    pub(crate) fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<ChannelEvent> {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms.entry(room_id).or_insert_with(RoomHub::new).tx.subscribe()
    }

    pub(crate) fn publish(&self, room_id: Uuid, event: FeedEvent) {
        let rooms = self.rooms.lock().expect("hub lock poisoned");
        if let Some(hub) = rooms.get(&room_id) {
            // No subscribers is fine; events before subscription are lost by
            // design, the initial load covers them.
            let _ = hub.tx.send(ChannelEvent::Feed(event));
        }
    }

    /// Last announcement wins; every track rebroadcasts the complete
    /// snapshot to all subscribers.
    pub(crate) fn track(&self, room_id: Uuid, user_id: Uuid, record: PresenceRecord) {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        let hub = rooms.entry(room_id).or_insert_with(RoomHub::new);
        debug!("presence track {} in {}: {:?}", user_id, room_id, record.status);
        hub.presence.insert(user_id, record);
        let _ = hub.tx.send(ChannelEvent::PresenceSync {
            state: hub.presence.clone(),
        });
    }

    pub(crate) fn untrack(&self, room_id: Uuid, user_id: Uuid) {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        let Some(hub) = rooms.get_mut(&room_id) else {
            return;
        };
        if hub.presence.remove(&user_id).is_some() {
            let _ = hub.tx.send(ChannelEvent::PresenceSync {
                state: hub.presence.clone(),
            });
        }
    }
}

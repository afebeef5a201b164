use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use cove_types::api::{NewMessage, NewReaction, SentMessage};
use cove_types::events::ChannelEvent;
use cove_types::models::{Message, PresenceRecord, Reaction};

use crate::error::{SubscribeError, WriteError};

/// The backend data store plus its adjacent collaborators: the display-name
/// directory and the response-generation trigger. Row-level authorization
/// lives server-side; the engine never re-derives permission locally.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn insert_message(&self, req: NewMessage) -> Result<SentMessage, WriteError>;

    async fn delete_message(&self, id: Uuid, room_id: Uuid) -> Result<(), WriteError>;

    async fn insert_reaction(&self, req: NewReaction) -> Result<Reaction, WriteError>;

    async fn delete_reaction(&self, id: Uuid) -> Result<(), WriteError>;

    /// Full authoritative room history, reactions attached, author names
    /// resolved. Seeds a freshly opened room and serves the delete-failure
    /// reload path.
    async fn load_room(&self, room_id: Uuid) -> Result<Vec<Message>, WriteError>;

    /// Display-name directory lookup for feed-delivered inserts.
    async fn resolve_name(&self, user_id: Uuid) -> Option<String>;

    /// Fire-and-forget hand-off to the response-generation collaborator. Its
    /// reply arrives later as an ordinary feed insert authored by the
    /// reserved assistant identity.
    async fn request_assistant_reply(&self, content: String, room_id: Uuid);
}

/// Per-room channel carrying the change feed and the presence broadcast.
/// Feed delivery is at-least-once with no cross-table ordering guarantee.
#[async_trait]
pub trait RoomChannel: Send + Sync + 'static {
    async fn subscribe(
        &self,
        room_id: Uuid,
    ) -> Result<broadcast::Receiver<ChannelEvent>, SubscribeError>;

    /// Announce (or re-announce) the local identity's presence record.
    /// Last announcement wins.
    async fn track(&self, room_id: Uuid, user_id: Uuid, record: PresenceRecord);

    async fn untrack(&self, room_id: Uuid, user_id: Uuid);
}

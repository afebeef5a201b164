use chrono::{DateTime, Utc};
use uuid::Uuid;

use cove_types::api::ReactionGroup;
use cove_types::models::{Message, Room};

use crate::reactions::ReactionAggregator;

/// One message prepared for rendering.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Authored by the local identity.
    pub mine: bool,
    pub reactions: Vec<ReactionGroup>,
}

impl MessageView {
    pub fn build(message: &Message, local_identity: Uuid) -> Self {
        Self {
            id: message.id,
            author_id: message.author_id,
            author_name: message.author_name.clone(),
            content: message.content.clone(),
            attachment_url: message.attachment_url.clone(),
            created_at: message.created_at,
            mine: message.author_id == local_identity,
            reactions: ReactionAggregator::group(message, local_identity),
        }
    }
}

/// The consistent, render-ready state of one room, republished after every
/// handler the actor dispatches.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub room: Room,
    /// Ascending by creation timestamp.
    pub messages: Vec<MessageView>,
    /// Other identities currently typing, by display name.
    pub typing: Vec<String>,
    pub draft: String,
    pub pending_attachment: Option<String>,
    /// Whether the change feed and presence channel are confirmed live.
    /// Writes are attempted regardless; only event visibility is gated.
    pub subscribed: bool,
}

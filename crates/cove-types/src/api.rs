use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

// -- Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
}

/// The authoritative row returned by a confirmed write, author name included
/// (the author's own sends carry it from the write response; only feed
/// deliveries need the directory).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SentMessage {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            room_id: self.room_id,
            author_id: self.author_id,
            author_name: self.author_name,
            content: self.content,
            attachment_url: self.attachment_url,
            created_at: self.created_at,
            reactions: vec![],
        }
    }
}

// -- Reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReaction {
    pub message_id: Uuid,
    pub author_id: Uuid,
    pub emoji: String,
}

/// One emoji's aggregate on a message, recomputed from the live reaction set
/// for every view rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub reacted: bool,
}

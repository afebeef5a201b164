use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved author id for generated assistant replies. Messages from this
/// identity arrive through the ordinary feed path like any other author's.
pub const ASSISTANT_USER_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000a1de);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
}

/// The local user as supplied by the identity/session provider. `name` is
/// already resolved (profile name or fallback); this engine never derives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

/// A message as held by the engine: the stored row plus the resolved author
/// display name and its current reaction set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    /// None when the message is attachment-only.
    pub content: Option<String>,
    /// Opaque object-storage URL.
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub author_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Typing,
}

/// Last-announced status for one connected identity. Fully ephemeral; a
/// presence sync replaces every record at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub name: String,
    pub status: PresenceStatus,
}

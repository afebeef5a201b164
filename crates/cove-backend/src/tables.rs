use std::collections::HashMap;

use uuid::Uuid;

use cove_types::events::MessageRow;
use cove_types::models::{Message, Reaction};

/// In-memory row storage: one map per table, the shape a relational backing
/// store would expose through its select contract.
#[derive(Default)]
pub(crate) struct Tables {
    pub messages: HashMap<Uuid, MessageRow>,
    pub reactions: HashMap<Uuid, Reaction>,
    pub profiles: HashMap<Uuid, String>,
}

impl Tables {
    pub(crate) fn display_name(&self, user_id: Uuid) -> String {
        self.profiles
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// One room's full history with reactions attached and author names
    /// resolved, ascending by creation timestamp.
    pub(crate) fn room_messages(&self, room_id: Uuid) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .values()
            .filter(|row| row.room_id == room_id)
            .map(|row| Message {
                id: row.id,
                room_id: row.room_id,
                author_id: row.author_id,
                author_name: self.display_name(row.author_id),
                content: row.content.clone(),
                attachment_url: row.attachment_url.clone(),
                created_at: row.created_at,
                reactions: self
                    .reactions
                    .values()
                    .filter(|r| r.message_id == row.id)
                    .cloned()
                    .collect(),
            })
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        messages
    }
}

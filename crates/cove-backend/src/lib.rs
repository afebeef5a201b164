//! In-memory reference implementation of the backend contracts the sync
//! engine consumes: row insert/delete/select, a per-room change feed, and a
//! presence channel with full-snapshot sync semantics. Backs the demo binary
//! and the integration tests; supports injecting a rejection into the next
//! write so every failure path is exercisable.

mod hub;
mod tables;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use cove_sync::backend::{Backend, RoomChannel};
use cove_sync::error::{SubscribeError, WriteError};
use cove_types::api::{NewMessage, NewReaction, SentMessage};
use cove_types::events::{ChannelEvent, FeedEvent, MessageRow};
use cove_types::models::{ASSISTANT_USER_ID, Message, PresenceRecord, Reaction};

use crate::hub::FeedHub;
use crate::tables::Tables;

#[derive(Default)]
struct Faults {
    message_insert: AtomicBool,
    message_delete: AtomicBool,
    reaction_insert: AtomicBool,
    reaction_delete: AtomicBool,
}

fn take(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::SeqCst)
}

pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    hub: FeedHub,
    faults: Faults,
    message_insert_attempts: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        tables
            .profiles
            .insert(ASSISTANT_USER_ID, "assistant".to_string());
        Self {
            tables: Mutex::new(tables),
            hub: FeedHub::new(),
            faults: Faults::default(),
            message_insert_attempts: AtomicUsize::new(0),
        }
    }

    pub fn register_profile(&self, user_id: Uuid, name: impl Into<String>) {
        self.tables
            .lock()
            .expect("tables lock poisoned")
            .profiles
            .insert(user_id, name.into());
    }

    /// Rejects the next message insert with a permission error.
    pub fn fail_next_message_insert(&self) {
        self.faults.message_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_message_delete(&self) {
        self.faults.message_delete.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_reaction_insert(&self) {
        self.faults.reaction_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_reaction_delete(&self) {
        self.faults.reaction_delete.store(true, Ordering::SeqCst);
    }

    /// How many message inserts were attempted, accepted or not.
    pub fn message_insert_attempts(&self) -> usize {
        self.message_insert_attempts.load(Ordering::SeqCst)
    }

    pub fn message_count(&self, room_id: Uuid) -> usize {
        self.tables
            .lock()
            .expect("tables lock poisoned")
            .messages
            .values()
            .filter(|row| row.room_id == room_id)
            .count()
    }

    pub fn reaction_count(&self, message_id: Uuid) -> usize {
        self.tables
            .lock()
            .expect("tables lock poisoned")
            .reactions
            .values()
            .filter(|r| r.message_id == message_id)
            .count()
    }

    fn insert_message_row(&self, req: NewMessage) -> SentMessage {
        let row = MessageRow {
            id: Uuid::new_v4(),
            room_id: req.room_id,
            author_id: req.author_id,
            content: req.content,
            attachment_url: req.attachment_url,
            created_at: chrono::Utc::now(),
        };
        let author_name = {
            let mut tables = self.tables.lock().expect("tables lock poisoned");
            tables.messages.insert(row.id, row.clone());
            tables.display_name(row.author_id)
        };
        self.hub
            .publish(row.room_id, FeedEvent::MessageInsert { row: row.clone() });
        SentMessage {
            id: row.id,
            room_id: row.room_id,
            author_id: row.author_id,
            author_name,
            content: row.content,
            attachment_url: row.attachment_url,
            created_at: row.created_at,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn insert_message(&self, req: NewMessage) -> Result<SentMessage, WriteError> {
        self.message_insert_attempts.fetch_add(1, Ordering::SeqCst);
        if take(&self.faults.message_insert) {
            return Err(WriteError::PermissionDenied);
        }
        Ok(self.insert_message_row(req))
    }

    async fn delete_message(&self, id: Uuid, room_id: Uuid) -> Result<(), WriteError> {
        if take(&self.faults.message_delete) {
            return Err(WriteError::PermissionDenied);
        }
        {
            let mut tables = self.tables.lock().expect("tables lock poisoned");
            if tables.messages.remove(&id).is_none() {
                return Ok(());
            }
            // Reaction rows cascade with their message.
            tables.reactions.retain(|_, r| r.message_id != id);
        }
        self.hub.publish(room_id, FeedEvent::MessageDelete { id });
        Ok(())
    }

    async fn insert_reaction(&self, req: NewReaction) -> Result<Reaction, WriteError> {
        if take(&self.faults.reaction_insert) {
            return Err(WriteError::PermissionDenied);
        }
        let reaction = Reaction {
            id: Uuid::new_v4(),
            message_id: req.message_id,
            author_id: req.author_id,
            emoji: req.emoji,
        };
        let room_id = {
            let mut tables = self.tables.lock().expect("tables lock poisoned");
            let room_id = tables
                .messages
                .get(&reaction.message_id)
                .map(|row| row.room_id)
                .ok_or_else(|| WriteError::Rejected("message not found".to_string()))?;
            tables.reactions.insert(reaction.id, reaction.clone());
            room_id
        };
        self.hub
            .publish(room_id, FeedEvent::ReactionInsert { row: reaction.clone() });
        Ok(reaction)
    }

    async fn delete_reaction(&self, id: Uuid) -> Result<(), WriteError> {
        if take(&self.faults.reaction_delete) {
            return Err(WriteError::PermissionDenied);
        }
        let room_id = {
            let mut tables = self.tables.lock().expect("tables lock poisoned");
            let Some(reaction) = tables.reactions.remove(&id) else {
                // Deleting an unknown id is not an error; the row may already
                // be gone.
                return Ok(());
            };
            tables
                .messages
                .get(&reaction.message_id)
                .map(|row| row.room_id)
        };
        if let Some(room_id) = room_id {
            self.hub.publish(room_id, FeedEvent::ReactionDelete { id });
        }
        Ok(())
    }

    async fn load_room(&self, room_id: Uuid) -> Result<Vec<Message>, WriteError> {
        Ok(self
            .tables
            .lock()
            .expect("tables lock poisoned")
            .room_messages(room_id))
    }

    async fn resolve_name(&self, user_id: Uuid) -> Option<String> {
        self.tables
            .lock()
            .expect("tables lock poisoned")
            .profiles
            .get(&user_id)
            .cloned()
    }

    async fn request_assistant_reply(&self, content: String, room_id: Uuid) {
        info!("assistant reply requested in room {}", room_id);
        self.insert_message_row(NewMessage {
            room_id,
            author_id: ASSISTANT_USER_ID,
            content: Some(format!("You asked: {content}")),
            attachment_url: None,
        });
    }
}

#[async_trait]
impl RoomChannel for InMemoryBackend {
    async fn subscribe(
        &self,
        room_id: Uuid,
    ) -> Result<broadcast::Receiver<ChannelEvent>, SubscribeError> {
        Ok(self.hub.subscribe(room_id))
    }

    async fn track(&self, room_id: Uuid, user_id: Uuid, record: PresenceRecord) {
        self.hub.track(room_id, user_id, record);
    }

    async fn untrack(&self, room_id: Uuid, user_id: Uuid) {
        self.hub.untrack(room_id, user_id);
    }
}

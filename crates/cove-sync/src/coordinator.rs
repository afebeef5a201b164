use cove_types::api::NewMessage;
use cove_types::models::Identity;
use uuid::Uuid;

/// Token that routes a sent message to the response-generation collaborator.
pub const ASSISTANT_TRIGGER: &str = "@ai";

/// A prepared send: the write request plus the compose state it consumed,
/// kept so a rejected write can restore the draft verbatim.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub request: NewMessage,
    pub draft: String,
    pub attachment: Option<String>,
}

/// Compose-surface state for the optimistic mutation coordinator: the draft
/// and the pending attachment reference, cleared eagerly on send and restored
/// verbatim on rejection.
#[derive(Debug)]
pub struct Composer {
    identity: Identity,
    room_id: Uuid,
    draft: String,
    attachment: Option<String>,
}

impl Composer {
    pub fn new(identity: Identity, room_id: Uuid) -> Self {
        Self {
            identity,
            room_id,
            draft: String::new(),
            attachment: None,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    pub fn set_draft(&mut self, draft: String) {
        self.draft = draft;
    }

    /// Attachment reference from object storage; treated as an opaque string.
    pub fn set_attachment(&mut self, url: Option<String>) {
        self.attachment = url;
    }

    /// Pre-flight validation plus the eager clear: the draft and attachment
    /// are taken *before* the remote call is issued, never after it resolves.
    /// Returns `None` when there is nothing to send; the submit affordance
    /// should already be disabled in that state, but the engine defends
    /// against ill-behaved callers anyway.
    pub fn prepare_send(&mut self) -> Option<PendingSend> {
        if self.draft.trim().is_empty() && self.attachment.is_none() {
            return None;
        }
        let draft = std::mem::take(&mut self.draft);
        let attachment = self.attachment.take();
        let content = if draft.is_empty() {
            None
        } else {
            Some(draft.clone())
        };
        Some(PendingSend {
            request: NewMessage {
                room_id: self.room_id,
                author_id: self.identity.user_id,
                content,
                attachment_url: attachment.clone(),
            },
            draft,
            attachment,
        })
    }

    /// Restores the compose state a rejected send consumed. Whatever was
    /// typed in the meantime is overwritten; the rejected content wins.
    pub fn restore(&mut self, draft: String, attachment: Option<String>) {
        self.draft = draft;
        self.attachment = attachment;
    }

    /// Drops unsaved compose state; the full-reload path discards it along
    /// with everything else not yet authoritative.
    pub fn discard(&mut self) {
        self.draft.clear();
        self.attachment = None;
    }
}

/// Whether sent content should fan out to the assistant collaborator.
pub fn wants_assistant_reply(content: &str) -> bool {
    content.contains(ASSISTANT_TRIGGER)
}

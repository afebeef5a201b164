use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PresenceRecord, Reaction};

/// A message row as the change feed delivers it, with no resolved author
/// name. The display-name directory fills that in for feed-delivered inserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row-level change-feed notifications. Delivery is at-least-once and carries
/// no cross-table ordering guarantee; consumers must be idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    MessageInsert { row: MessageRow },

    /// Delete notifications only expose the old row's primary key.
    MessageDelete { id: Uuid },

    ReactionInsert { row: Reaction },

    ReactionDelete { id: Uuid },
}

/// Everything a subscribed per-room channel can deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    Feed(FeedEvent),

    /// Complete snapshot of all tracked identities, keyed by connection
    /// identity. Replaces prior knowledge entirely, never a diff.
    PresenceSync { state: HashMap<Uuid, PresenceRecord> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PresenceStatus;

    #[test]
    fn feed_events_are_tagged_by_type() {
        let event = FeedEvent::MessageDelete {
            id: Uuid::from_u128(7),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MessageDelete");
        assert_eq!(json["data"]["id"], Uuid::from_u128(7).to_string());
    }

    #[test]
    fn presence_sync_decodes_lowercase_statuses() {
        let user = Uuid::from_u128(3);
        let json = format!(
            r#"{{"type":"PresenceSync","data":{{"state":{{"{user}":{{"name":"ada","status":"typing"}}}}}}}}"#
        );
        let event: ChannelEvent = serde_json::from_str(&json).unwrap();
        let ChannelEvent::PresenceSync { state } = event else {
            panic!("expected a presence sync");
        };
        assert_eq!(state[&user].status, PresenceStatus::Typing);
    }
}

//! Two simulated clients in one room over the in-memory backend: sends,
//! typing presence, a reaction toggle, and an assistant-triggered reply.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use uuid::Uuid;

use cove_backend::InMemoryBackend;
use cove_sync::open;
use cove_types::models::{Identity, Room};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cove=debug".into()),
        )
        .init();

    let room_name = std::env::var("COVE_ROOM").unwrap_or_else(|_| "general".into());

    let backend = Arc::new(InMemoryBackend::new());
    let ada = Identity {
        user_id: Uuid::new_v4(),
        name: "ada".into(),
    };
    let bea = Identity {
        user_id: Uuid::new_v4(),
        name: "bea".into(),
    };
    backend.register_profile(ada.user_id, "ada");
    backend.register_profile(bea.user_id, "bea");

    let room = Room {
        id: Uuid::new_v4(),
        name: room_name,
    };

    let ada_room = open(room.clone(), ada, backend.clone(), backend.clone());
    let bea_room = open(room.clone(), bea, backend.clone(), backend.clone());

    let mut ada_view = ada_room.view();
    while !ada_view.borrow().subscribed {
        ada_view.changed().await?;
    }
    let mut bea_view = bea_room.view();
    while !bea_view.borrow().subscribed {
        bea_view.changed().await?;
    }

    bea_room.set_composing(true);
    bea_room.set_draft("hi ada! hey @ai introduce yourself");
    bea_room.send_message();
    bea_room.set_composing(false);

    // bea's message plus the assistant reply.
    while ada_view.borrow().messages.len() < 2 {
        ada_view.changed().await?;
    }

    ada_room.set_draft("welcome both of you");
    ada_room.send_message();
    while ada_view.borrow().messages.len() < 3 {
        ada_view.changed().await?;
    }

    let first_id = ada_view.borrow().messages[0].id;
    ada_room.toggle_reaction(first_id, "👋");
    while ada_view.borrow().messages[0].reactions.is_empty() {
        ada_view.changed().await?;
    }

    {
        let view = ada_view.borrow();
        info!("room '{}' as seen by ada:", view.room.name);
        for m in &view.messages {
            let reactions: Vec<String> = m
                .reactions
                .iter()
                .map(|g| format!("{}x{}", g.emoji, g.count))
                .collect();
            info!(
                "  [{}] {}: {} {}",
                m.created_at.format("%H:%M:%S"),
                m.author_name,
                m.content.as_deref().unwrap_or("<attachment>"),
                reactions.join(" ")
            );
        }
    }

    bea_room.close().await;
    ada_room.close().await;
    Ok(())
}

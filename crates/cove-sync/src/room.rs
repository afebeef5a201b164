use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cove_types::api::SentMessage;
use cove_types::events::{ChannelEvent, FeedEvent, MessageRow};
use cove_types::models::{Identity, Message, PresenceRecord, PresenceStatus, Reaction, Room};

use crate::backend::{Backend, RoomChannel};
use crate::coordinator::{Composer, wants_assistant_reply};
use crate::error::WriteError;
use crate::presence::PresenceTracker;
use crate::reactions::{InsertOutcome, OpToken, ReactionAggregator, ToggleAction};
use crate::store::MessageStore;
use crate::view::{MessageView, RoomView};

/// User-input commands routed into the actor's dispatch loop.
#[derive(Debug)]
enum Command {
    SetDraft(String),
    SetAttachment(Option<String>),
    Send,
    DeleteMessage(Uuid),
    ToggleReaction { message_id: Uuid, emoji: String },
    ComposerFocus(bool),
    Close,
}

/// Completions of spawned remote calls, keyed by stable identifiers so
/// out-of-order resolution reconciles correctly. Acks for a closed room land
/// on a dropped receiver and are discarded.
#[derive(Debug)]
enum Ack {
    Subscribed(broadcast::Receiver<ChannelEvent>),
    SubscribeFailed,
    SendOk(SentMessage),
    SendFailed {
        draft: String,
        attachment: Option<String>,
        error: WriteError,
    },
    DeleteFailed {
        id: Uuid,
        error: WriteError,
    },
    Reloaded(Result<Vec<Message>, WriteError>),
    ReactionInsertOk {
        token: OpToken,
        reaction: Reaction,
    },
    ReactionInsertFailed {
        token: OpToken,
        error: WriteError,
    },
    ReactionRemoveOk {
        token: OpToken,
    },
    ReactionRemoveFailed {
        token: OpToken,
        error: WriteError,
    },
    /// Feed-delivered insert with its author name resolved.
    FeedInsertReady(Message),
}

/// Owning handle for one room's channel and stores. Exactly one may be live
/// per room per client context; switching rooms means closing this handle
/// before opening the next. Dropping the handle tears the room down too.
pub struct RoomHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<RoomView>,
    task: JoinHandle<()>,
}

impl RoomHandle {
    pub fn set_draft(&self, draft: impl Into<String>) {
        self.send(Command::SetDraft(draft.into()));
    }

    pub fn set_attachment(&self, url: Option<String>) {
        self.send(Command::SetAttachment(url));
    }

    pub fn send_message(&self) {
        self.send(Command::Send);
    }

    pub fn delete_message(&self, id: Uuid) {
        self.send(Command::DeleteMessage(id));
    }

    pub fn toggle_reaction(&self, message_id: Uuid, emoji: impl Into<String>) {
        self.send(Command::ToggleReaction {
            message_id,
            emoji: emoji.into(),
        });
    }

    /// Compose surface gained or lost focus; announces Typing or Online.
    pub fn set_composing(&self, composing: bool) {
        self.send(Command::ComposerFocus(composing));
    }

    /// Watch the render-ready view; republished after every dispatched
    /// handler.
    pub fn view(&self) -> watch::Receiver<RoomView> {
        self.view_rx.clone()
    }

    /// Withdraws presence and tears the channel down. Requests still in
    /// flight are not cancelled; their completions are discarded.
    pub async fn close(self) {
        let _ = self.cmd_tx.send(Command::Close);
        let _ = self.task.await;
    }

    fn send(&self, cmd: Command) {
        // Dropped receiver means the room is already closed; the command is
        // stale by definition.
        let _ = self.cmd_tx.send(cmd);
    }
}

/// Opens one room: seeds history, subscribes the change feed and presence
/// channel, and starts the dispatch loop. Local writes are accepted
/// immediately; availability is not gated on subscription confirmation.
pub fn open(
    room: Room,
    identity: Identity,
    backend: Arc<dyn Backend>,
    channel: Arc<dyn RoomChannel>,
) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    let (presence_tx, announcer) = spawn_announcer(channel.clone(), room.id, identity.clone());

    let state = RoomState {
        view_tx: watch::channel(RoomView {
            room: room.clone(),
            messages: vec![],
            typing: vec![],
            draft: String::new(),
            pending_attachment: None,
            subscribed: false,
        })
        .0,
        store: MessageStore::new(),
        reactions: ReactionAggregator::new(),
        presence: PresenceTracker::new(identity.user_id),
        composer: Composer::new(identity.clone(), room.id),
        subscribed: false,
        room,
        identity,
        backend,
        channel,
        ack_tx,
        presence_tx,
        announcer,
    };

    let view_rx = state.view_tx.subscribe();
    let task = tokio::spawn(state.run(cmd_rx, ack_rx));

    RoomHandle {
        cmd_tx,
        view_rx,
        task,
    }
}

struct RoomState {
    room: Room,
    identity: Identity,
    backend: Arc<dyn Backend>,
    channel: Arc<dyn RoomChannel>,
    ack_tx: mpsc::UnboundedSender<Ack>,
    presence_tx: mpsc::UnboundedSender<PresenceStatus>,
    announcer: JoinHandle<()>,
    view_tx: watch::Sender<RoomView>,
    store: MessageStore,
    reactions: ReactionAggregator,
    presence: PresenceTracker,
    composer: Composer,
    subscribed: bool,
}

impl RoomState {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut ack_rx: mpsc::UnboundedReceiver<Ack>,
    ) {
        info!(
            "{} ({}) opening room {} ({})",
            self.identity.name, self.identity.user_id, self.room.name, self.room.id
        );

        // Seed authoritative history before dispatching anything else.
        match self.backend.load_room(self.room.id).await {
            Ok(messages) => self.store.replace_all(messages),
            Err(e) => warn!("Initial load for room {} failed: {}", self.room.id, e),
        }

        // Subscription is spawned, not awaited: commands issued before the
        // confirmation arrives are still attempted.
        {
            let channel = self.channel.clone();
            let ack_tx = self.ack_tx.clone();
            let room_id = self.room.id;
            tokio::spawn(async move {
                let ack = match channel.subscribe(room_id).await {
                    Ok(rx) => Ack::Subscribed(rx),
                    Err(e) => {
                        warn!("Subscribe for room {} failed: {}", room_id, e);
                        Ack::SubscribeFailed
                    }
                };
                let _ = ack_tx.send(ack);
            });
        }

        let mut feed_rx: Option<broadcast::Receiver<ChannelEvent>> = None;
        self.publish();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Close) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(ack) = ack_rx.recv() => match ack {
                    Ack::Subscribed(rx) => {
                        feed_rx = Some(rx);
                        self.subscribed = true;
                        // Re-announce on every (re)connect.
                        self.announce(PresenceStatus::Online);
                    }
                    Ack::SubscribeFailed => {
                        self.subscribed = false;
                    }
                    ack => self.handle_ack(ack),
                },
                event = next_channel_event(&mut feed_rx) => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => {
                        // Channel closed out from under us; feed and presence
                        // visibility are gone, writes keep working.
                        warn!("Channel for room {} closed", self.room.id);
                        feed_rx = None;
                        self.subscribed = false;
                    }
                },
            }
            self.publish();
        }

        // Closing the queue makes the announcer withdraw the presence record
        // after every still-queued announce has committed; awaiting it makes
        // the withdrawal the final presence act of this room.
        drop(self.presence_tx);
        let _ = self.announcer.await;
        info!(
            "{} ({}) closed room {}",
            self.identity.name, self.identity.user_id, self.room.id
        );
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Close => unreachable!("handled by the dispatch loop"),

            Command::SetDraft(draft) => self.composer.set_draft(draft),

            Command::SetAttachment(url) => self.composer.set_attachment(url),

            Command::Send => {
                let Some(pending) = self.composer.prepare_send() else {
                    debug!("Empty submit rejected pre-flight");
                    return;
                };
                let backend = self.backend.clone();
                let ack_tx = self.ack_tx.clone();
                tokio::spawn(async move {
                    let ack = match backend.insert_message(pending.request).await {
                        Ok(sent) => Ack::SendOk(sent),
                        Err(error) => Ack::SendFailed {
                            draft: pending.draft,
                            attachment: pending.attachment,
                            error,
                        },
                    };
                    let _ = ack_tx.send(ack);
                });
            }

            Command::DeleteMessage(id) => {
                // Optimistic removal first; absent ids are a no-op.
                if !self.store.remove(id) {
                    return;
                }
                let backend = self.backend.clone();
                let ack_tx = self.ack_tx.clone();
                let room_id = self.room.id;
                tokio::spawn(async move {
                    if let Err(error) = backend.delete_message(id, room_id).await {
                        let _ = ack_tx.send(Ack::DeleteFailed { id, error });
                    }
                });
            }

            Command::ToggleReaction { message_id, emoji } => {
                let action = self.reactions.toggle(
                    &mut self.store,
                    message_id,
                    &emoji,
                    self.identity.user_id,
                );
                match action {
                    Some(ToggleAction::Insert { token, request }) => {
                        let backend = self.backend.clone();
                        let ack_tx = self.ack_tx.clone();
                        tokio::spawn(async move {
                            let ack = match backend.insert_reaction(request).await {
                                Ok(reaction) => Ack::ReactionInsertOk { token, reaction },
                                Err(error) => Ack::ReactionInsertFailed { token, error },
                            };
                            let _ = ack_tx.send(ack);
                        });
                    }
                    Some(ToggleAction::Remove { token, reaction_id }) => {
                        let backend = self.backend.clone();
                        let ack_tx = self.ack_tx.clone();
                        tokio::spawn(async move {
                            let ack = match backend.delete_reaction(reaction_id).await {
                                Ok(()) => Ack::ReactionRemoveOk { token },
                                Err(error) => Ack::ReactionRemoveFailed { token, error },
                            };
                            let _ = ack_tx.send(ack);
                        });
                    }
                    None => {}
                }
            }

            Command::ComposerFocus(composing) => {
                self.announce(if composing {
                    PresenceStatus::Typing
                } else {
                    PresenceStatus::Online
                });
            }
        }
    }

    fn handle_ack(&mut self, ack: Ack) {
        match ack {
            Ack::Subscribed(_) | Ack::SubscribeFailed => {
                unreachable!("handled by the dispatch loop")
            }

            Ack::SendOk(sent) => {
                let content = sent.content.clone();
                self.store.insert(sent.into_message());
                // Fan out to the assistant only after the local append; its
                // reply arrives later as an ordinary feed insert.
                if let Some(content) = content {
                    if wants_assistant_reply(&content) {
                        let backend = self.backend.clone();
                        let room_id = self.room.id;
                        tokio::spawn(async move {
                            backend.request_assistant_reply(content, room_id).await;
                        });
                    }
                }
            }

            Ack::SendFailed {
                draft,
                attachment,
                error,
            } => {
                warn!("Send to room {} rejected: {}", self.room.id, error);
                self.composer.restore(draft, attachment);
            }

            Ack::DeleteFailed { id, error } => {
                // Documented policy: reload the whole room from the
                // authoritative source rather than resurrecting one message.
                warn!(
                    "Delete of message {} rejected ({}); reloading room {}",
                    id, error, self.room.id
                );
                let backend = self.backend.clone();
                let ack_tx = self.ack_tx.clone();
                let room_id = self.room.id;
                tokio::spawn(async move {
                    let _ = ack_tx.send(Ack::Reloaded(backend.load_room(room_id).await));
                });
            }

            Ack::Reloaded(Ok(messages)) => {
                self.store.replace_all(messages);
                self.reactions.clear_pending();
                self.composer.discard();
            }

            Ack::Reloaded(Err(error)) => {
                warn!("Reload of room {} failed: {}", self.room.id, error);
            }

            Ack::ReactionInsertOk { token, reaction } => {
                match self
                    .reactions
                    .commit_insert(&mut self.store, token, reaction)
                {
                    InsertOutcome::Orphaned(orphan) => {
                        // The placeholder was toggled away while the insert
                        // was in flight; clean up the surplus server row.
                        let backend = self.backend.clone();
                        tokio::spawn(async move {
                            if let Err(e) = backend.delete_reaction(orphan.id).await {
                                warn!("Orphaned reaction {} cleanup failed: {}", orphan.id, e);
                            }
                        });
                    }
                    InsertOutcome::Applied | InsertOutcome::Stale => {}
                }
            }

            Ack::ReactionInsertFailed { token, error } => {
                warn!("Reaction insert rejected: {}", error);
                self.reactions.abort_insert(&mut self.store, token);
            }

            Ack::ReactionRemoveOk { token } => {
                self.reactions.commit_remove(token);
            }

            Ack::ReactionRemoveFailed { token, error } => {
                warn!("Reaction delete rejected: {}", error);
                self.reactions.abort_remove(&mut self.store, token);
            }

            Ack::FeedInsertReady(message) => {
                // Second line of defense: the store's id-dedup absorbs any
                // echo that slipped past the author filter, and its
                // tombstones drop rows deleted while the name lookup was in
                // flight.
                self.store.insert(message);
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Feed(FeedEvent::MessageInsert { row }) => {
                // Self-echo filter: our own optimistic insert already covers
                // this row.
                if row.author_id == self.identity.user_id {
                    return;
                }
                if row.room_id != self.room.id {
                    return;
                }
                self.resolve_and_insert(row);
            }

            ChannelEvent::Feed(FeedEvent::MessageDelete { id }) => {
                self.store.remove(id);
            }

            ChannelEvent::Feed(FeedEvent::ReactionInsert { row }) => {
                if row.author_id == self.identity.user_id {
                    return;
                }
                self.store.add_reaction(row);
            }

            ChannelEvent::Feed(FeedEvent::ReactionDelete { id }) => {
                self.store.remove_reaction(id);
            }

            ChannelEvent::PresenceSync { state } => {
                self.presence.apply_sync(state);
            }
        }
    }

    /// Resolves the author's display name off the dispatch loop, then feeds
    /// the completed message back through the ack channel.
    fn resolve_and_insert(&self, row: MessageRow) {
        let backend = self.backend.clone();
        let ack_tx = self.ack_tx.clone();
        tokio::spawn(async move {
            let author_name = backend
                .resolve_name(row.author_id)
                .await
                .unwrap_or_else(|| "Unknown".to_string());
            let _ = ack_tx.send(Ack::FeedInsertReady(Message {
                id: row.id,
                room_id: row.room_id,
                author_id: row.author_id,
                author_name,
                content: row.content,
                attachment_url: row.attachment_url,
                created_at: row.created_at,
                reactions: vec![],
            }));
        });
    }

    /// Queues a presence announce; the announcer task commits them in order.
    fn announce(&self, status: PresenceStatus) {
        let _ = self.presence_tx.send(status);
    }

    fn publish(&self) {
        let messages = self
            .store
            .snapshot()
            .map(|m| MessageView::build(m, self.identity.user_id))
            .collect();
        self.view_tx.send_replace(RoomView {
            room: self.room.clone(),
            messages,
            typing: self.presence.typing_users(),
            draft: self.composer.draft().to_string(),
            pending_attachment: self.composer.attachment().map(str::to_string),
            subscribed: self.subscribed,
        });
    }
}

/// One task serializes all presence writes for the room, so a slow channel
/// cannot reorder a Typing announce past a later Online one. When the actor
/// drops its sender the task drains the queue, withdraws the record, and
/// exits; the untrack therefore always commits last.
fn spawn_announcer(
    channel: Arc<dyn RoomChannel>,
    room_id: Uuid,
    identity: Identity,
) -> (mpsc::UnboundedSender<PresenceStatus>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            let record = PresenceRecord {
                name: identity.name.clone(),
                status,
            };
            channel.track(room_id, identity.user_id, record).await;
        }
        channel.untrack(room_id, identity.user_id).await;
    });
    (tx, task)
}

/// Next event from the subscribed channel, or pending forever while no
/// subscription is live. Lagged broadcast receivers warn and keep reading.
async fn next_channel_event(
    rx: &mut Option<broadcast::Receiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    let Some(rx) = rx.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Channel receiver lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

//! Client-side realtime synchronization engine for a multi-room chat client.
//!
//! One actor task per open room reconciles local optimistic mutations, a
//! row-level change feed, and an ephemeral presence broadcast into a
//! render-ready [`view::RoomView`]. All store mutations
//! commit inside the actor's dispatch loop, in dispatch order; remote calls
//! are spawned and reconciled through acknowledgments keyed by stable ids.

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod presence;
pub mod reactions;
pub mod room;
pub mod store;
pub mod view;

pub use backend::{Backend, RoomChannel};
pub use error::{SubscribeError, WriteError};
pub use room::{RoomHandle, open};
pub use view::{MessageView, RoomView};

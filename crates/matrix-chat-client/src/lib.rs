//! Thin Matrix client-server API wrapper.
//!
//! Covers exactly what the bridge consumes: password login, the joined-room
//! list, folded room state, room creation (optionally as a space), state
//! events, message sends with an optional timestamp override, and
//! incremental `/sync` with `m.room.message` extraction. No end-to-end
//! encryption, no media.

mod client;
mod error;
mod types;

pub use client::MatrixClient;
pub use error::{MatrixError, MatrixResult};
pub use types::{
    EventId, InboundEvent, MessageContent, NewRoomSpec, RoomId, RoomStateSummary, SyncBatch,
    UserId, MSGTYPE_NOTICE, MSGTYPE_TEXT,
};

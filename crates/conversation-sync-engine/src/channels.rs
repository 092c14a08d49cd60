//! Channel traits decoupling the engine from the HTTP clients.
//!
//! The engine only ever talks to the remote service and the chat network
//! through these two traits, so every piece of sync logic can be exercised
//! in tests with scripted implementations.

use crate::EngineResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostex_api_client::{Conversation, RemoteMessage};
use matrix_chat_client::{EventId, NewRoomSpec, RoomId, RoomStateSummary, SyncBatch, UserId};

/// The remote property-management service: conversation list, message list,
/// and outbound message send.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Fetch all current conversations.
    async fn list_conversations(&self) -> EngineResult<Vec<Conversation>>;

    /// Fetch up to `limit` messages newer than `since` for a conversation.
    async fn list_messages(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> EngineResult<Vec<RemoteMessage>>;

    /// Send a text message into a conversation.
    async fn send_message(&self, conversation_id: &str, text: &str) -> EngineResult<()>;
}

/// The chat network: session, rooms, message sends, and the inbound event
/// stream via incremental sync.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Establish the session and return the bridge's own user id.
    async fn connect(&self) -> EngineResult<UserId>;

    /// List joined rooms.
    async fn joined_rooms(&self) -> EngineResult<Vec<RoomId>>;

    /// Folded state summary of one room.
    async fn room_state(&self, room: &RoomId) -> EngineResult<RoomStateSummary>;

    /// Create a room (or space) and return its id.
    async fn create_room(&self, spec: &NewRoomSpec) -> EngineResult<RoomId>;

    /// Attach `child` as a child room of the space `space`.
    async fn add_space_child(&self, space: &RoomId, child: &RoomId) -> EngineResult<()>;

    /// Send a plain text message, optionally with a timestamp override in
    /// milliseconds.
    async fn send_text(
        &self,
        room: &RoomId,
        body: &str,
        ts_millis: Option<i64>,
    ) -> EngineResult<EventId>;

    /// Send a non-alerting notice.
    async fn send_notice(&self, room: &RoomId, body: &str) -> EngineResult<EventId>;

    /// One sync round trip; `since` of `None` acquires the current stream
    /// position.
    async fn sync(&self, since: Option<&str>) -> EngineResult<SyncBatch>;
}

//! Channel implementations backed by the real HTTP clients.

use crate::{ChatChannel, EngineResult, RemoteChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostex_api_client::{Conversation, HostexClient, RemoteMessage};
use matrix_chat_client::{
    EventId, MatrixClient, MessageContent, NewRoomSpec, RoomId, RoomStateSummary, SyncBatch, UserId,
};

/// [`RemoteChannel`] backed by the Hostex API.
#[derive(Debug, Clone)]
pub struct HostexRemoteChannel {
    client: HostexClient,
}

impl HostexRemoteChannel {
    /// Wrap a Hostex client.
    pub fn new(client: HostexClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteChannel for HostexRemoteChannel {
    async fn list_conversations(&self) -> EngineResult<Vec<Conversation>> {
        Ok(self.client.list_conversations().await?)
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> EngineResult<Vec<RemoteMessage>> {
        Ok(self.client.list_messages(conversation_id, since, limit).await?)
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> EngineResult<()> {
        Ok(self.client.send_message(conversation_id, text).await?)
    }
}

/// [`ChatChannel`] backed by a Matrix homeserver.
#[derive(Debug)]
pub struct MatrixChatChannel {
    client: MatrixClient,
    username: String,
    password: String,
    /// Server names put in `via` hints on space-child events.
    via: Vec<String>,
}

impl MatrixChatChannel {
    /// Wrap a Matrix client with the credentials used by [`ChatChannel::connect`].
    pub fn new(
        client: MatrixClient,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            client,
            username: username.into(),
            password: password.into(),
            via: vec![domain.into()],
        }
    }
}

#[async_trait]
impl ChatChannel for MatrixChatChannel {
    async fn connect(&self) -> EngineResult<UserId> {
        Ok(self.client.login(&self.username, &self.password).await?)
    }

    async fn joined_rooms(&self) -> EngineResult<Vec<RoomId>> {
        Ok(self.client.joined_rooms().await?)
    }

    async fn room_state(&self, room: &RoomId) -> EngineResult<RoomStateSummary> {
        Ok(self.client.room_state(room).await?)
    }

    async fn create_room(&self, spec: &NewRoomSpec) -> EngineResult<RoomId> {
        Ok(self.client.create_room(spec).await?)
    }

    async fn add_space_child(&self, space: &RoomId, child: &RoomId) -> EngineResult<()> {
        Ok(self.client.add_space_child(space, child, &self.via).await?)
    }

    async fn send_text(
        &self,
        room: &RoomId,
        body: &str,
        ts_millis: Option<i64>,
    ) -> EngineResult<EventId> {
        Ok(self
            .client
            .send_message(room, &MessageContent::text(body), ts_millis)
            .await?)
    }

    async fn send_notice(&self, room: &RoomId, body: &str) -> EngineResult<EventId> {
        Ok(self
            .client
            .send_message(room, &MessageContent::notice(body), None)
            .await?)
    }

    async fn sync(&self, since: Option<&str>) -> EngineResult<SyncBatch> {
        Ok(self.client.sync(since).await?)
    }
}

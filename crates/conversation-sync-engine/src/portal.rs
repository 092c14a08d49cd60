//! Portal: the pairing of one remote conversation with one chat room.

use crate::context::BridgeContext;
use crate::EngineResult;
use bridge_database::{queries, MessageRecord, PortalRecord};
use chrono::{DateTime, TimeZone, Utc};
use hostex_api_client::{Conversation, RemoteMessage};
use matrix_chat_client::{InboundEvent, NewRoomSpec, RoomId, MSGTYPE_TEXT};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// How many remote messages one backfill pass fetches past the cursor.
const BACKFILL_LIMIT: u32 = 10;

/// One remote conversation bound to (at most) one chat room.
///
/// The room is created lazily on the first poll that sees the conversation
/// and recovered from the store after a restart; it is never deleted.
pub struct Portal {
    conversation_id: String,
    room_id: RwLock<Option<RoomId>>,
    info: RwLock<Option<Conversation>>,
}

impl Portal {
    /// A portal with no room and no cached metadata yet.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            room_id: RwLock::new(None),
            info: RwLock::new(None),
        }
    }

    /// The remote conversation id this portal is keyed by.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The assigned room, if one exists.
    pub async fn room_id(&self) -> Option<RoomId> {
        self.room_id.read().await.clone()
    }

    /// The most recently fetched conversation metadata.
    pub async fn info(&self) -> Option<Conversation> {
        self.info.read().await.clone()
    }

    /// Cache the latest remote snapshot in memory.
    pub async fn update_info(&self, info: Conversation) {
        *self.info.write().await = Some(info);
    }

    /// Take over an already-known room id without creating anything.
    pub async fn adopt_room(&self, room: RoomId) {
        *self.room_id.write().await = Some(room);
    }

    /// Make sure the conversation has a room, creating one at most once.
    ///
    /// Resolution order: the in-memory room id, then the persisted mapping
    /// (restart recovery), then room creation. The new mapping is persisted
    /// immediately after creation; a crash between the two can orphan a
    /// duplicate room on the next run, which is a known limitation. The
    /// write lock is held for the whole sequence so concurrent callers
    /// cannot race past the check.
    pub async fn ensure_room(&self, ctx: &BridgeContext) -> EngineResult<RoomId> {
        let mut guard = self.room_id.write().await;
        if let Some(room) = guard.as_ref() {
            return Ok(room.clone());
        }

        let conversation_id = self.conversation_id.clone();
        let stored = ctx
            .db
            .call(move |conn| queries::portal_room_id(conn, &conversation_id))
            .await?;
        if let Some(room) = stored {
            let room = RoomId::new(room);
            debug!(
                conversation_id = %self.conversation_id,
                room_id = %room,
                "Adopted existing room from store"
            );
            *guard = Some(room.clone());
            return Ok(room);
        }

        let info = self.info.read().await.clone();
        let (name, topic) = room_profile(&self.conversation_id, info.as_ref());
        let spec = NewRoomSpec {
            name: name.clone(),
            topic: topic.clone(),
            invite: vec![ctx.settings.admin_user_id.clone()],
            as_space: false,
        };
        let room = ctx.chat.create_room(&spec).await?;
        info!(
            conversation_id = %self.conversation_id,
            room_id = %room,
            "Created room for conversation"
        );

        let record = PortalRecord {
            conversation_id: self.conversation_id.clone(),
            room_id: Some(room.as_str().to_string()),
            name: Some(name),
            topic: Some(topic),
            avatar_url: None,
            encrypted: false,
        };
        ctx.db
            .call(move |conn| queries::upsert_portal(conn, &record))
            .await?;

        if ctx.settings.personal_space_enabled {
            if let Some(space) = ctx.space_room.read().await.clone() {
                if let Err(e) = ctx.chat.add_space_child(&space, &room).await {
                    warn!(
                        room_id = %room,
                        error = %e,
                        "Failed to attach room to personal space"
                    );
                }
            }
        }

        *guard = Some(room.clone());
        Ok(room)
    }

    /// Relay remote messages newer than the stored cursor into the room.
    ///
    /// The cursor is the maximum stored message timestamp (absent means the
    /// epoch). Each message is recorded immediately after a successful send,
    /// so a crash mid-backfill loses at most the in-flight message and the
    /// next pass resumes from the last recorded timestamp.
    pub async fn backfill(&self, ctx: &BridgeContext) -> EngineResult<()> {
        let Some(room) = self.room_id.read().await.clone() else {
            return Ok(());
        };

        let conversation_id = self.conversation_id.clone();
        let cursor = ctx
            .db
            .call(move |conn| queries::last_message_timestamp(conn, &conversation_id))
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let messages = ctx
            .remote
            .list_messages(&self.conversation_id, cursor, BACKFILL_LIMIT)
            .await?;
        if messages.is_empty() {
            return Ok(());
        }
        debug!(
            conversation_id = %self.conversation_id,
            count = messages.len(),
            "Backfilling messages"
        );

        for message in messages {
            if let Err(e) = self.deliver(ctx, &room, &message).await {
                error!(
                    conversation_id = %self.conversation_id,
                    message_id = %message.id,
                    error = %e,
                    "Failed to relay backfilled message"
                );
            }
        }

        Ok(())
    }

    /// Send one remote message into the room and record it.
    async fn deliver(
        &self,
        ctx: &BridgeContext,
        room: &RoomId,
        message: &RemoteMessage,
    ) -> EngineResult<()> {
        let local = message.timestamp.with_timezone(&ctx.settings.timezone);
        let event_id = ctx
            .chat
            .send_text(room, &message.content, Some(local.timestamp_millis()))
            .await?;

        let record = MessageRecord {
            conversation_id: self.conversation_id.clone(),
            event_id: event_id.as_str().to_string(),
            timestamp: message.timestamp,
            sender: message.sender.clone(),
            body: message.content.clone(),
        };
        if let Err(e) = ctx
            .db
            .call(move |conn| queries::insert_message(conn, &record).map(|_| ()))
            .await
        {
            warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "Failed to record relayed message"
            );
        }
        Ok(())
    }

    /// Relay a chat message into the remote conversation.
    ///
    /// Non-text events are ignored. A failed remote send is logged and the
    /// event dropped, never retried; the message row is still written so the
    /// store reflects what was attempted.
    pub async fn relay_inbound(&self, ctx: &BridgeContext, event: &InboundEvent) -> EngineResult<()> {
        if event.msgtype != MSGTYPE_TEXT {
            debug!(
                conversation_id = %self.conversation_id,
                msgtype = %event.msgtype,
                "Ignoring non-text event"
            );
            return Ok(());
        }

        if let Err(e) = ctx
            .remote
            .send_message(&self.conversation_id, &event.body)
            .await
        {
            error!(
                conversation_id = %self.conversation_id,
                event_id = %event.event_id,
                error = %e,
                "Failed to deliver message to remote service, dropping"
            );
        }

        let timestamp = Utc
            .timestamp_millis_opt(event.origin_server_ts)
            .single()
            .unwrap_or_else(Utc::now);
        let record = MessageRecord {
            conversation_id: self.conversation_id.clone(),
            event_id: event.event_id.as_str().to_string(),
            timestamp,
            sender: event.sender.as_str().to_string(),
            body: event.body.clone(),
        };
        if let Err(e) = ctx
            .db
            .call(move |conn| queries::insert_message(conn, &record).map(|_| ()))
            .await
        {
            warn!(
                conversation_id = %self.conversation_id,
                error = %e,
                "Failed to record inbound message"
            );
        }
        Ok(())
    }
}

/// Room name and topic derived from the latest conversation snapshot.
fn room_profile(conversation_id: &str, info: Option<&Conversation>) -> (String, String) {
    match info {
        Some(c) => (
            format!("{} - {}", c.channel_type, c.guest.name),
            format!("Hostex conversation for {}", c.property_title),
        ),
        None => (format!("Hostex conversation {conversation_id}"), String::new()),
    }
}

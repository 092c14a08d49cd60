//! Scripted and recording channel implementations for engine tests.

use crate::bridge::Bridge;
use crate::context::{BridgeContext, BridgeSettings};
use crate::{ChatChannel, EngineError, EngineResult, RemoteChannel};
use async_trait::async_trait;
use bridge_database::BridgeDb;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use hostex_api_client::{Conversation, Guest, HostexError, RemoteMessage};
use matrix_chat_client::{
    EventId, MatrixError, NewRoomSpec, RoomId, RoomStateSummary, SyncBatch, UserId,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn remote_error(message: &str) -> EngineError {
    EngineError::Remote(HostexError::Api {
        code: 500,
        message: message.to_string(),
    })
}

fn chat_error(message: &str) -> EngineError {
    EngineError::Chat(MatrixError::Api {
        status: 500,
        errcode: "M_UNKNOWN".to_string(),
        error: message.to_string(),
    })
}

/// Remote channel returning scripted data and recording every call.
#[derive(Default)]
pub struct ScriptedRemoteChannel {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<String, Vec<RemoteMessage>>>,
    failing_message_lists: Mutex<HashSet<String>>,
    /// Arguments of every `list_messages` call.
    pub message_queries: Mutex<Vec<(String, DateTime<Utc>, u32)>>,
    /// Number of `list_conversations` calls.
    pub conversation_queries: AtomicU32,
    /// Every delivered `(conversation_id, text)` pair.
    pub sent: Mutex<Vec<(String, String)>>,
    /// When set, `send_message` fails.
    pub fail_send: AtomicBool,
    /// When set, `list_conversations` fails.
    pub fail_list: AtomicBool,
}

impl ScriptedRemoteChannel {
    pub fn add_conversation(&self, conversation: Conversation) {
        self.conversations.lock().unwrap().push(conversation);
    }

    pub fn add_message(&self, conversation_id: &str, message: RemoteMessage) {
        self.messages
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    /// Make `list_messages` fail for one conversation.
    pub fn fail_messages_for(&self, conversation_id: &str) {
        self.failing_message_lists
            .lock()
            .unwrap()
            .insert(conversation_id.to_string());
    }
}

#[async_trait]
impl RemoteChannel for ScriptedRemoteChannel {
    async fn list_conversations(&self) -> EngineResult<Vec<Conversation>> {
        self.conversation_queries.fetch_add(1, Ordering::Relaxed);
        if self.fail_list.load(Ordering::Relaxed) {
            return Err(remote_error("conversation list unavailable"));
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> EngineResult<Vec<RemoteMessage>> {
        self.message_queries
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), since, limit));
        if self
            .failing_message_lists
            .lock()
            .unwrap()
            .contains(conversation_id)
        {
            return Err(remote_error("message list unavailable"));
        }
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(conversation_id)
            .map(|all| {
                all.iter()
                    .filter(|m| m.timestamp > since)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> EngineResult<()> {
        if self.fail_send.load(Ordering::Relaxed) {
            return Err(remote_error("send rejected"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Chat channel recording every send and returning generated ids.
pub struct RecordingChatChannel {
    joined: Mutex<Vec<(RoomId, RoomStateSummary)>>,
    /// Every `create_room` call.
    pub created: Mutex<Vec<NewRoomSpec>>,
    /// Every `(space, child)` attachment.
    pub space_children: Mutex<Vec<(RoomId, RoomId)>>,
    /// Every `(room, body, ts_millis)` text send.
    pub texts: Mutex<Vec<(RoomId, String, Option<i64>)>>,
    /// Every `(room, body)` notice.
    pub notices: Mutex<Vec<(RoomId, String)>>,
    /// Batches handed out by `sync`, in order; exhausted means an error.
    pub sync_batches: Mutex<VecDeque<SyncBatch>>,
    /// When set, `create_room` fails.
    pub fail_create: AtomicBool,
    /// When set, `create_room` waits for `create_released`.
    pub gate_create: AtomicBool,
    /// Lets a gated `create_room` proceed.
    pub create_released: tokio::sync::Notify,
    /// When set, `add_space_child` fails.
    pub fail_attach: AtomicBool,
    next_room: AtomicU64,
    next_event: AtomicU64,
}

impl RecordingChatChannel {
    pub fn new() -> Self {
        Self {
            joined: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            space_children: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            sync_batches: Mutex::new(VecDeque::new()),
            fail_create: AtomicBool::new(false),
            gate_create: AtomicBool::new(false),
            create_released: tokio::sync::Notify::new(),
            fail_attach: AtomicBool::new(false),
            next_room: AtomicU64::new(1),
            next_event: AtomicU64::new(1),
        }
    }

    /// Pre-populate a joined room with the given folded state.
    pub fn add_joined(&self, room_id: &str, state: RoomStateSummary) {
        self.joined
            .lock()
            .unwrap()
            .push((RoomId::new(room_id), state));
    }
}

#[async_trait]
impl ChatChannel for RecordingChatChannel {
    async fn connect(&self) -> EngineResult<UserId> {
        Ok(UserId::new("@bridge:example.org"))
    }

    async fn joined_rooms(&self) -> EngineResult<Vec<RoomId>> {
        Ok(self
            .joined
            .lock()
            .unwrap()
            .iter()
            .map(|(room, _)| room.clone())
            .collect())
    }

    async fn room_state(&self, room: &RoomId) -> EngineResult<RoomStateSummary> {
        self.joined
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == room)
            .map(|(_, state)| state.clone())
            .ok_or_else(|| chat_error("unknown room"))
    }

    async fn create_room(&self, spec: &NewRoomSpec) -> EngineResult<RoomId> {
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(chat_error("room creation rejected"));
        }
        if self.gate_create.load(Ordering::Relaxed) {
            self.create_released.notified().await;
        }
        let n = self.next_room.fetch_add(1, Ordering::Relaxed);
        let room = RoomId::new(format!("!room{n}:example.org"));
        self.created.lock().unwrap().push(spec.clone());
        Ok(room)
    }

    async fn add_space_child(&self, space: &RoomId, child: &RoomId) -> EngineResult<()> {
        if self.fail_attach.load(Ordering::Relaxed) {
            return Err(chat_error("attach rejected"));
        }
        self.space_children
            .lock()
            .unwrap()
            .push((space.clone(), child.clone()));
        Ok(())
    }

    async fn send_text(
        &self,
        room: &RoomId,
        body: &str,
        ts_millis: Option<i64>,
    ) -> EngineResult<EventId> {
        let n = self.next_event.fetch_add(1, Ordering::Relaxed);
        self.texts
            .lock()
            .unwrap()
            .push((room.clone(), body.to_string(), ts_millis));
        Ok(EventId::new(format!("$evt{n}")))
    }

    async fn send_notice(&self, room: &RoomId, body: &str) -> EngineResult<EventId> {
        let n = self.next_event.fetch_add(1, Ordering::Relaxed);
        self.notices
            .lock()
            .unwrap()
            .push((room.clone(), body.to_string()));
        Ok(EventId::new(format!("$evt{n}")))
    }

    async fn sync(&self, _since: Option<&str>) -> EngineResult<SyncBatch> {
        self.sync_batches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| chat_error("no more sync batches"))
    }
}

pub fn test_settings() -> BridgeSettings {
    BridgeSettings {
        admin_user_id: UserId::new("@admin:example.org"),
        timezone: Tz::UTC,
        poll_interval: Duration::from_secs(10),
        personal_space_enabled: false,
    }
}

pub async fn test_context(
    remote: Arc<ScriptedRemoteChannel>,
    chat: Arc<RecordingChatChannel>,
) -> Arc<BridgeContext> {
    let db = BridgeDb::open_in_memory().await.unwrap();
    Arc::new(BridgeContext::new(remote, chat, db, test_settings()))
}

pub async fn test_context_with_space(
    remote: Arc<ScriptedRemoteChannel>,
    chat: Arc<RecordingChatChannel>,
) -> Arc<BridgeContext> {
    let db = BridgeDb::open_in_memory().await.unwrap();
    let mut settings = test_settings();
    settings.personal_space_enabled = true;
    Arc::new(BridgeContext::new(remote, chat, db, settings))
}

pub async fn test_bridge(
    remote: Arc<ScriptedRemoteChannel>,
    chat: Arc<RecordingChatChannel>,
) -> Bridge {
    let db = BridgeDb::open_in_memory().await.unwrap();
    Bridge::new(remote, chat, db, test_settings())
}

pub fn conversation(id: &str, guest: &str, channel: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        channel_type: channel.to_string(),
        last_message_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        guest: Guest {
            name: guest.to_string(),
            phone: String::new(),
            email: String::new(),
        },
        property_title: "Seaside Flat".to_string(),
        check_in_date: "2023-11-20".to_string(),
        check_out_date: "2023-11-25".to_string(),
    }
}

pub fn remote_message(id: &str, body: &str, secs: i64, sender: &str) -> RemoteMessage {
    RemoteMessage {
        id: id.to_string(),
        content: body.to_string(),
        timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        sender: sender.to_string(),
    }
}

pub fn inbound_event(
    room: &str,
    event_id: &str,
    sender: &str,
    body: &str,
) -> matrix_chat_client::InboundEvent {
    matrix_chat_client::InboundEvent {
        room_id: RoomId::new(room),
        event_id: EventId::new(event_id),
        sender: UserId::new(sender),
        msgtype: "m.text".to_string(),
        body: body.to_string(),
        origin_server_ts: 1_700_000_000_000,
    }
}

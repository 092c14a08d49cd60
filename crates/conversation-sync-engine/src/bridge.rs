//! Bridge lifecycle: startup resolution, the two sync loops, and routing.

use crate::context::{BridgeContext, BridgeSettings};
use crate::{ChatChannel, EngineError, EngineResult, RemoteChannel};
use bridge_database::{queries, BridgeDb};
use chrono::Utc;
use matrix_chat_client::{InboundEvent, NewRoomSpec, RoomId};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Display name identifying the management room among joined rooms.
const CONTROL_ROOM_NAME: &str = "Hostex Bridge Management";
const CONTROL_ROOM_TOPIC: &str = "Management room for Hostex bridge";

/// Display name identifying the personal space.
const SPACE_NAME: &str = "Hostex Conversations";
const SPACE_TOPIC: &str = "Personal space for Hostex conversations";

const SETUP_NOTICE: &str = "Hostex bridge has been set up and is now running.";

/// Delay before retrying the chat sync after a transport error.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle state of one bridge instance.
///
/// Transitions are one-directional and non-repeatable; only `Running`
/// accepts poll ticks and inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built, not yet started.
    Created,
    /// Startup resolution in progress.
    Starting,
    /// Loops running.
    Running,
    /// Shutdown in progress.
    Stopping,
    /// Terminal state.
    Stopped,
}

impl EngineState {
    /// Lowercase state label used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// The synchronization engine: owns the polling loop, the chat sync loop,
/// and the registries that route work to portals and dispatchers.
pub struct Bridge {
    ctx: Arc<BridgeContext>,
    state: Mutex<EngineState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Build a bridge around the given channels, store, and settings.
    pub fn new(
        remote: Arc<dyn RemoteChannel>,
        chat: Arc<dyn ChatChannel>,
        db: BridgeDb,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            ctx: Arc::new(BridgeContext::new(remote, chat, db, settings)),
            state: Mutex::new(EngineState::Created),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared engine context.
    pub fn context(&self) -> Arc<BridgeContext> {
        self.ctx.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn transition(&self, from: EngineState, to: EngineState) -> EngineResult<()> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != from {
            return Err(EngineError::State {
                expected: from.as_str(),
                actual: state.as_str(),
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: EngineState) {
        *self.state.lock().expect("state lock poisoned") = to;
    }

    /// Connect, resolve the control room (and space), and start the loops.
    ///
    /// Any failure before the loops are spawned is fatal: the bridge moves
    /// straight to `Stopped` and the error propagates.
    pub async fn start(&self) -> EngineResult<()> {
        self.transition(EngineState::Created, EngineState::Starting)?;
        info!("Starting Hostex bridge");

        if let Err(e) = self.resolve_rooms().await {
            self.set_state(EngineState::Stopped);
            return Err(e);
        }
        if let Err(e) = self.restore_portals().await {
            self.set_state(EngineState::Stopped);
            return Err(e);
        }

        self.set_state(EngineState::Running);
        self.spawn_loops();

        // One-time startup notice; losing it is not worth failing startup.
        let control = self.ctx.control_room.read().await.clone();
        if let Some(control) = control {
            if let Err(e) = self.ctx.chat.send_notice(&control, SETUP_NOTICE).await {
                warn!(error = %e, "Failed to send setup notice");
            }
        }

        info!("Hostex bridge is running");
        Ok(())
    }

    async fn resolve_rooms(&self) -> EngineResult<()> {
        let own_user = self.ctx.chat.connect().await?;
        info!(user_id = %own_user, "Connected to chat network");
        *self.ctx.own_user.write().await = Some(own_user);
        self.ctx.chat_connected.store(true, Ordering::Relaxed);

        let control = self.resolve_control_room().await?;
        *self.ctx.control_room.write().await = Some(control);

        if self.ctx.settings.personal_space_enabled {
            let space = self.resolve_personal_space().await?;
            *self.ctx.space_room.write().await = Some(space);
        }
        Ok(())
    }

    /// Find the management room by exact name among joined rooms, or create
    /// it and invite the admin.
    async fn resolve_control_room(&self) -> EngineResult<RoomId> {
        let rooms = self.ctx.chat.joined_rooms().await?;
        for room in rooms {
            let state = match self.ctx.chat.room_state(&room).await {
                Ok(state) => state,
                Err(e) => {
                    debug!(room_id = %room, error = %e, "Skipping unreadable room");
                    continue;
                }
            };
            if state.name.as_deref() == Some(CONTROL_ROOM_NAME) {
                info!(room_id = %room, "Found management room");
                return Ok(room);
            }
        }

        let spec = NewRoomSpec {
            name: CONTROL_ROOM_NAME.to_string(),
            topic: CONTROL_ROOM_TOPIC.to_string(),
            invite: vec![self.ctx.settings.admin_user_id.clone()],
            as_space: false,
        };
        let room = self.ctx.chat.create_room(&spec).await?;
        info!(room_id = %room, "Created management room");
        Ok(room)
    }

    /// Find the personal space, matched by being a space with the designated
    /// name, or create it.
    async fn resolve_personal_space(&self) -> EngineResult<RoomId> {
        let rooms = self.ctx.chat.joined_rooms().await?;
        for room in rooms {
            let state = match self.ctx.chat.room_state(&room).await {
                Ok(state) => state,
                Err(e) => {
                    debug!(room_id = %room, error = %e, "Skipping unreadable room");
                    continue;
                }
            };
            if state.is_space && state.name.as_deref() == Some(SPACE_NAME) {
                info!(room_id = %room, "Found personal space");
                return Ok(room);
            }
        }

        let spec = NewRoomSpec {
            name: SPACE_NAME.to_string(),
            topic: SPACE_TOPIC.to_string(),
            invite: Vec::new(),
            as_space: true,
        };
        let room = self.ctx.chat.create_room(&spec).await?;
        info!(room_id = %room, "Created personal space");
        Ok(room)
    }

    /// Re-adopt persisted room mappings into the registry.
    ///
    /// After a restart the registry starts empty; without this, inbound
    /// messages for already-bridged rooms would be dropped as unknown until
    /// a poll cycle re-saw their conversations.
    async fn restore_portals(&self) -> EngineResult<()> {
        let records = self.ctx.db.call(queries::load_portals).await?;
        let mut restored = 0usize;
        for record in records {
            let Some(room) = record.room_id else {
                continue;
            };
            let portal = self.ctx.portal_for(&record.conversation_id).await;
            portal.adopt_room(RoomId::new(room)).await;
            restored += 1;
        }
        if restored > 0 {
            info!(count = restored, "Restored portal rooms from store");
        }
        Ok(())
    }

    fn spawn_loops(&self) {
        let mut tasks = self.tasks.lock().expect("tasks lock poisoned");
        tasks.push(tokio::spawn(poll_loop(
            self.ctx.clone(),
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(chat_sync_loop(
            self.ctx.clone(),
            self.cancel.clone(),
        )));
    }

    /// Signal both loops to stop and wait for them to exit.
    ///
    /// Cooperative: in-flight network calls are allowed to finish, so
    /// shutdown latency is bounded by the slowest of them.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            match *state {
                EngineState::Running => *state = EngineState::Stopping,
                EngineState::Stopping | EngineState::Stopped => return,
                _ => {
                    *state = EngineState::Stopped;
                    return;
                }
            }
        }

        info!("Stopping Hostex bridge");
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().expect("tasks lock poisoned");
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Bridge task ended abnormally");
            }
        }
        self.set_state(EngineState::Stopped);
        info!("Hostex bridge stopped");
    }
}

/// Timer loop driving [`poll_once`] at the configured interval.
async fn poll_loop(ctx: Arc<BridgeContext>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Polling loop stopped");
                return;
            }
            _ = ticker.tick() => poll_once(&ctx).await,
        }
    }
}

/// One full poll cycle over the remote conversation list.
///
/// A failure fetching the list abandons the cycle (the next tick retries);
/// a failure on one conversation is isolated and the rest still run.
pub(crate) async fn poll_once(ctx: &Arc<BridgeContext>) {
    *ctx.last_poll.write().await = Some(Utc::now());

    let conversations = match ctx.remote.list_conversations().await {
        Ok(conversations) => conversations,
        Err(e) => {
            warn!(error = %e, "Failed to fetch conversations, skipping poll cycle");
            return;
        }
    };
    debug!(count = conversations.len(), "Polled remote conversations");

    for conversation in conversations {
        let conversation_id = conversation.id.clone();
        let portal = ctx.portal_for(&conversation_id).await;
        portal.update_info(conversation).await;

        if let Err(e) = portal.ensure_room(ctx).await {
            warn!(
                conversation_id = %conversation_id,
                error = %e,
                "Failed to ensure room, will retry next poll"
            );
            continue;
        }
        if let Err(e) = portal.backfill(ctx).await {
            warn!(conversation_id = %conversation_id, error = %e, "Backfill failed");
        }
    }
}

/// Long-poll loop consuming the inbound chat event stream.
///
/// The first sync only acquires a stream position; its backlog is discarded
/// so historical events are never re-relayed. Transport errors back off a
/// fixed delay without affecting the polling loop.
async fn chat_sync_loop(ctx: Arc<BridgeContext>, cancel: CancellationToken) {
    let mut since: Option<String> = None;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Chat sync loop stopped");
                return;
            }
            result = ctx.chat.sync(since.as_deref()) => result,
        };

        match result {
            Ok(batch) => {
                let initial = since.is_none();
                since = Some(batch.next_batch);
                if initial {
                    debug!("Acquired sync position, discarding backlog");
                    continue;
                }
                for event in batch.events {
                    route_inbound(&ctx, event).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Chat sync failed, retrying shortly");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(SYNC_RETRY_DELAY) => {}
                }
            }
        }
    }
}

/// Route one inbound chat event to the dispatcher or the owning portal.
pub(crate) async fn route_inbound(ctx: &Arc<BridgeContext>, event: InboundEvent) {
    // Our own relayed messages come back through sync; never loop them.
    if ctx.own_user.read().await.as_ref() == Some(&event.sender) {
        return;
    }

    let control = ctx.control_room.read().await.clone();
    if control.as_ref() == Some(&event.room_id) {
        let dispatcher = ctx.dispatcher_for(&event.sender).await;
        dispatcher.handle(ctx, &event.room_id, &event.body).await;
        return;
    }

    match ctx.portal_by_room(&event.room_id).await {
        Some(portal) => {
            if let Err(e) = portal.relay_inbound(ctx, &event).await {
                error!(room_id = %event.room_id, error = %e, "Failed to relay inbound message");
            }
        }
        None => {
            warn!(room_id = %event.room_id, "Received message for unknown room, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        conversation, inbound_event, remote_message, test_bridge, test_context,
        RecordingChatChannel, ScriptedRemoteChannel,
    };
    use bridge_database::PortalRecord;
    use matrix_chat_client::{RoomStateSummary, UserId};

    // ===== lifecycle =====

    #[tokio::test(start_paused = true)]
    async fn start_creates_control_room_and_sends_setup_notice() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        let chat = Arc::new(RecordingChatChannel::new());
        let bridge = test_bridge(remote, chat.clone()).await;

        bridge.start().await.unwrap();
        assert_eq!(bridge.state(), EngineState::Running);

        let created = chat.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, CONTROL_ROOM_NAME);
        assert_eq!(created[0].invite.len(), 1);
        drop(created);

        let notices = chat.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].1, SETUP_NOTICE);
        drop(notices);

        bridge.stop().await;
        assert_eq!(bridge.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_adopts_existing_control_room() {
        let chat = Arc::new(RecordingChatChannel::new());
        chat.add_joined(
            "!mgmt:example.org",
            RoomStateSummary {
                name: Some(CONTROL_ROOM_NAME.to_string()),
                is_space: false,
            },
        );
        let bridge = test_bridge(Arc::new(ScriptedRemoteChannel::default()), chat.clone()).await;

        bridge.start().await.unwrap();

        assert!(chat.created.lock().unwrap().is_empty());
        let control = bridge.context().control_room.read().await.clone().unwrap();
        assert_eq!(control.as_str(), "!mgmt:example.org");

        bridge.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_an_error() {
        let bridge = test_bridge(
            Arc::new(ScriptedRemoteChannel::default()),
            Arc::new(RecordingChatChannel::new()),
        )
        .await;

        bridge.start().await.unwrap();
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, EngineError::State { .. }));

        bridge.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_room_creation_aborts_startup() {
        let chat = Arc::new(RecordingChatChannel::new());
        chat.fail_create.store(true, Ordering::Relaxed);
        let bridge = test_bridge(Arc::new(ScriptedRemoteChannel::default()), chat).await;

        assert!(bridge.start().await.is_err());
        assert_eq!(bridge.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_restores_persisted_portals_for_inbound_routing() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        let chat = Arc::new(RecordingChatChannel::new());
        let bridge = test_bridge(remote.clone(), chat).await;

        bridge
            .context()
            .db
            .call(|conn| {
                queries::upsert_portal(
                    conn,
                    &PortalRecord {
                        conversation_id: "c1".to_string(),
                        room_id: Some("!r1:example.org".to_string()),
                        name: Some("Airbnb - Alice".to_string()),
                        topic: None,
                        avatar_url: None,
                        encrypted: false,
                    },
                )
            })
            .await
            .unwrap();

        bridge.start().await.unwrap();

        // No poll has seen c1 yet, but its room is already routable.
        let ctx = bridge.context();
        let event = inbound_event("!r1:example.org", "$e1", "@admin:example.org", "welcome back");
        route_inbound(&ctx, event).await;

        let sent = remote.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "c1");
        drop(sent);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn stop_before_start_is_terminal() {
        let bridge = test_bridge(
            Arc::new(ScriptedRemoteChannel::default()),
            Arc::new(RecordingChatChannel::new()),
        )
        .await;
        bridge.stop().await;
        assert_eq!(bridge.state(), EngineState::Stopped);
        assert!(bridge.start().await.is_err());
    }

    // ===== poll_once =====

    #[tokio::test]
    async fn poll_once_bridges_a_new_conversation_end_to_end() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        remote.add_conversation(conversation("c1", "Alice", "Airbnb"));
        remote.add_message("c1", remote_message("m1", "hi", 1_700_000_000, "Alice"));
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote, chat.clone()).await;

        poll_once(&ctx).await;

        // One room, one portal row, one message row, one chat send.
        assert_eq!(chat.created.lock().unwrap().len(), 1);
        let room = ctx
            .db
            .call(|conn| queries::portal_room_id(conn, "c1"))
            .await
            .unwrap();
        assert!(room.is_some());

        let texts = chat.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, "hi");
        drop(texts);

        let cursor = ctx
            .db
            .call(|conn| queries::last_message_timestamp(conn, "c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.timestamp(), 1_700_000_000);
        assert!(ctx.last_poll.read().await.is_some());
    }

    #[tokio::test]
    async fn poll_once_repeated_does_not_duplicate_rooms_or_messages() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        remote.add_conversation(conversation("c1", "Alice", "Airbnb"));
        remote.add_message("c1", remote_message("m1", "hi", 1_700_000_000, "Alice"));
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote, chat.clone()).await;

        poll_once(&ctx).await;
        poll_once(&ctx).await;

        assert_eq!(chat.created.lock().unwrap().len(), 1);
        // Second cycle's cursor excludes the already-relayed message.
        assert_eq!(chat.texts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_once_isolates_per_conversation_failures() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        remote.add_conversation(conversation("c1", "Alice", "Airbnb"));
        remote.add_conversation(conversation("c2", "Bob", "Vrbo"));
        remote.add_message("c2", remote_message("m2", "hello", 1_700_000_000, "Bob"));
        remote.fail_messages_for("c1");
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote, chat.clone()).await;

        poll_once(&ctx).await;

        // c1's backfill failed but c2 still got its message.
        let texts = chat.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].1, "hello");
    }

    #[tokio::test]
    async fn poll_once_skips_cycle_when_list_fails() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        remote.fail_list.store(true, Ordering::Relaxed);
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote, chat.clone()).await;

        poll_once(&ctx).await;

        assert!(chat.created.lock().unwrap().is_empty());
        // The cycle still counts as a poll attempt.
        assert!(ctx.last_poll.read().await.is_some());
    }

    // ===== route_inbound =====

    #[tokio::test]
    async fn own_events_are_dropped() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote.clone(), chat.clone()).await;
        *ctx.own_user.write().await = Some(UserId::new("@bridge:example.org"));
        *ctx.control_room.write().await = Some(RoomId::new("!control:example.org"));

        let event = inbound_event("!control:example.org", "$e1", "@bridge:example.org", "!help");
        route_inbound(&ctx, event).await;

        assert!(chat.notices.lock().unwrap().is_empty());
        assert!(remote.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn control_room_events_reach_the_dispatcher() {
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(Arc::new(ScriptedRemoteChannel::default()), chat.clone()).await;
        *ctx.control_room.write().await = Some(RoomId::new("!control:example.org"));

        let event = inbound_event("!control:example.org", "$e1", "@admin:example.org", "!help");
        route_inbound(&ctx, event).await;

        let notices = chat.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0.as_str(), "!control:example.org");
    }

    #[tokio::test]
    async fn portal_room_events_relay_to_the_remote_service() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote.clone(), chat).await;
        let portal = ctx.portal_for("c1").await;
        portal.adopt_room(RoomId::new("!r1:example.org")).await;

        let event = inbound_event("!r1:example.org", "$e1", "@admin:example.org", "hello guest");
        route_inbound(&ctx, event).await;

        let sent = remote.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "c1");
    }

    #[tokio::test]
    async fn unknown_room_events_are_dropped() {
        let remote = Arc::new(ScriptedRemoteChannel::default());
        let chat = Arc::new(RecordingChatChannel::new());
        let ctx = test_context(remote.clone(), chat.clone()).await;

        let event = inbound_event("!foreign:example.org", "$e1", "@admin:example.org", "hi");
        route_inbound(&ctx, event).await;

        assert!(remote.sent.lock().unwrap().is_empty());
        assert!(chat.notices.lock().unwrap().is_empty());
    }

    // ===== state labels =====

    #[test]
    fn state_labels_are_lowercase() {
        assert_eq!(EngineState::Created.as_str(), "created");
        assert_eq!(EngineState::Stopped.as_str(), "stopped");
    }
}

//! Shared engine state and the portal/dispatcher registries.

use crate::commands::CommandDispatcher;
use crate::portal::Portal;
use crate::{ChatChannel, RemoteChannel};
use bridge_config_and_utils::Config;
use bridge_database::BridgeDb;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use matrix_chat_client::{RoomId, UserId};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Immutable engine settings snapshot, taken from the config at startup.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// The only user allowed to issue management commands.
    pub admin_user_id: UserId,
    /// Display timezone for relayed timestamps.
    pub timezone: Tz,
    /// Interval between remote polls.
    pub poll_interval: Duration,
    /// Whether portal rooms are grouped under a personal space.
    pub personal_space_enabled: bool,
}

impl BridgeSettings {
    /// Build settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            admin_user_id: UserId::new(config.admin_user_id.clone()),
            timezone: config.display_timezone(),
            poll_interval: config.poll_interval(),
            personal_space_enabled: config.personal_space_enabled,
        }
    }
}

/// State shared by the polling loop, the chat sync loop, and command tasks.
///
/// The portal and dispatcher registries are only touched through the
/// lookup-or-insert helpers below, which hold the registry mutex across the
/// whole operation; two tasks can never create two instances for the same
/// key.
pub struct BridgeContext {
    /// The remote service channel.
    pub remote: Arc<dyn RemoteChannel>,
    /// The chat network channel.
    pub chat: Arc<dyn ChatChannel>,
    /// The persistence store.
    pub db: BridgeDb,
    /// Settings snapshot.
    pub settings: BridgeSettings,
    /// The management room, once resolved.
    pub control_room: RwLock<Option<RoomId>>,
    /// The personal space room, once resolved (when enabled).
    pub space_room: RwLock<Option<RoomId>>,
    /// The bridge's own chat user, once connected.
    pub own_user: RwLock<Option<UserId>>,
    /// Time of the most recent poll cycle.
    pub last_poll: RwLock<Option<DateTime<Utc>>>,
    /// Whether the chat session is established.
    pub chat_connected: AtomicBool,
    portals: Mutex<HashMap<String, Arc<Portal>>>,
    dispatchers: Mutex<HashMap<UserId, Arc<CommandDispatcher>>>,
}

impl BridgeContext {
    /// Create a fresh context around the given channels and store.
    pub fn new(
        remote: Arc<dyn RemoteChannel>,
        chat: Arc<dyn ChatChannel>,
        db: BridgeDb,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            remote,
            chat,
            db,
            settings,
            control_room: RwLock::new(None),
            space_room: RwLock::new(None),
            own_user: RwLock::new(None),
            last_poll: RwLock::new(None),
            chat_connected: AtomicBool::new(false),
            portals: Mutex::new(HashMap::new()),
            dispatchers: Mutex::new(HashMap::new()),
        }
    }

    /// The portal for a conversation, created on first sight.
    pub async fn portal_for(&self, conversation_id: &str) -> Arc<Portal> {
        let mut portals = self.portals.lock().await;
        portals
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Portal::new(conversation_id)))
            .clone()
    }

    /// The portal whose room matches, if any.
    ///
    /// Probes a snapshot so the registry mutex is never held while waiting
    /// on a portal's room id lock.
    pub async fn portal_by_room(&self, room: &RoomId) -> Option<Arc<Portal>> {
        for portal in self.portals_snapshot().await {
            if portal.room_id().await.as_ref() == Some(room) {
                return Some(portal);
            }
        }
        None
    }

    /// All portals currently in the registry.
    pub async fn portals_snapshot(&self) -> Vec<Arc<Portal>> {
        self.portals.lock().await.values().cloned().collect()
    }

    /// The command dispatcher for a sender, created on first sight.
    pub async fn dispatcher_for(&self, user: &UserId) -> Arc<CommandDispatcher> {
        let mut dispatchers = self.dispatchers.lock().await;
        dispatchers
            .entry(user.clone())
            .or_insert_with(|| Arc::new(CommandDispatcher::new(user.clone())))
            .clone()
    }
}

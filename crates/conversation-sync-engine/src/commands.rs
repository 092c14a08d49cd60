//! Management command parsing and dispatch.

use crate::bridge::poll_once;
use crate::context::BridgeContext;
use bridge_database::queries;
use matrix_chat_client::{RoomId, UserId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn};

/// Static reply to `!help`.
pub const HELP_TEXT: &str = "Available commands:\n\
!help - Show this help message\n\
!status - Show bridge status\n\
!list - List active conversations\n\
!sync - Force sync conversations from Hostex";

/// Reply to anything that is not a known command.
pub const UNKNOWN_COMMAND_TEXT: &str =
    "Unknown command. Type !help for a list of available commands.";

const SYNC_STARTING_TEXT: &str = "Forcing sync of conversations from Hostex...";
const SYNC_COMPLETE_TEXT: &str = "Sync complete. Use !list to see updated conversations.";

/// The closed management command vocabulary.
///
/// Parsed from the first whitespace-delimited token, case-insensitively;
/// everything unrecognized lands on [`Command::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `!help`
    Help,
    /// `!status`
    Status,
    /// `!list`
    List,
    /// `!sync`
    Sync,
    /// Anything else.
    Unknown,
}

impl Command {
    /// Parse a message body into a command.
    pub fn parse(body: &str) -> Self {
        let Some(first) = body.split_whitespace().next() else {
            return Self::Unknown;
        };
        match first.to_ascii_lowercase().as_str() {
            "!help" => Self::Help,
            "!status" => Self::Status,
            "!list" => Self::List,
            "!sync" => Self::Sync,
            _ => Self::Unknown,
        }
    }
}

/// Command handler for one chat sender.
///
/// Only the configured admin identity gets replies; everyone else is logged
/// and ignored without any response.
pub struct CommandDispatcher {
    user_id: UserId,
}

impl CommandDispatcher {
    /// A dispatcher bound to one sender.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// The sender this dispatcher belongs to.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Interpret one control-room message.
    pub async fn handle(&self, ctx: &Arc<BridgeContext>, room: &RoomId, body: &str) {
        if self.user_id != ctx.settings.admin_user_id {
            warn!(sender = %self.user_id, "Ignoring command from unauthorized sender");
            return;
        }
        if body.split_whitespace().next().is_none() {
            return;
        }

        match Command::parse(body) {
            Command::Help => self.notify(ctx, room, HELP_TEXT).await,
            Command::Status => {
                let text = status_text(ctx).await;
                self.notify(ctx, room, &text).await;
            }
            Command::List => {
                let text = list_text(ctx).await;
                self.notify(ctx, room, &text).await;
            }
            Command::Sync => {
                self.notify(ctx, room, SYNC_STARTING_TEXT).await;
                let ctx = Arc::clone(ctx);
                let room = room.clone();
                // The poll must not block command handling; the completion
                // notice is sent once the spawned cycle finishes.
                tokio::spawn(async move {
                    poll_once(&ctx).await;
                    if let Err(e) = ctx.chat.send_notice(&room, SYNC_COMPLETE_TEXT).await {
                        warn!(error = %e, "Failed to send sync completion notice");
                    }
                });
            }
            Command::Unknown => self.notify(ctx, room, UNKNOWN_COMMAND_TEXT).await,
        }
    }

    async fn notify(&self, ctx: &BridgeContext, room: &RoomId, text: &str) {
        if let Err(e) = ctx.chat.send_notice(room, text).await {
            error!(room_id = %room, error = %e, "Failed to send notice");
        }
    }
}

/// Build the `!status` reply.
async fn status_text(ctx: &BridgeContext) -> String {
    let connected = ctx.chat_connected.load(Ordering::Relaxed);
    let bridged = match ctx.db.call(queries::bridged_portal_count).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Failed to count bridged portals");
            0
        }
    };
    let last_poll = match *ctx.last_poll.read().await {
        Some(at) => at.with_timezone(&ctx.settings.timezone).to_rfc3339(),
        None => "never".to_string(),
    };
    format!(
        "Bridge Status:\n\
         Connected to Matrix: {connected}\n\
         Bridged conversations: {bridged}\n\
         Last poll time: {last_poll}\n\
         Timezone: {}",
        ctx.settings.timezone
    )
}

/// Build the `!list` reply from the in-memory portal registry.
async fn list_text(ctx: &BridgeContext) -> String {
    let mut out = String::from("Active conversations:\n");
    let mut count = 0;
    for portal in ctx.portals_snapshot().await {
        let Some(room) = portal.room_id().await else {
            continue;
        };
        let Some(info) = portal.info().await else {
            continue;
        };
        count += 1;
        out.push_str(&format!(
            "\n- {} ({})\n  Room: {}\n  Last activity: {}\n",
            info.guest.name,
            info.channel_type,
            room,
            info.last_message_at
                .with_timezone(&ctx.settings.timezone)
                .to_rfc3339(),
        ));
    }
    if count == 0 {
        return "No active conversations yet.".to_string();
    }
    out
}

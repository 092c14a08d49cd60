//! Model types for the bridged entities.

use chrono::{DateTime, Utc};

/// One remote conversation paired with a Matrix room.
///
/// `room_id` is absent until the room has been created; the pairing is
/// never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalRecord {
    /// Stable remote conversation identifier.
    pub conversation_id: String,
    /// Matrix room id, once assigned.
    pub room_id: Option<String>,
    /// Room display name at creation time.
    pub name: Option<String>,
    /// Room topic at creation time.
    pub topic: Option<String>,
    /// Avatar reference, if any.
    pub avatar_url: Option<String>,
    /// Whether the room uses encryption.
    pub encrypted: bool,
}

/// One relayed message, stored for deduplication and cursor purposes.
///
/// Rows are inserted once per delivered message and never updated; only
/// `MAX(timestamp)` per conversation is ever read back.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// The conversation this message belongs to.
    pub conversation_id: String,
    /// Matrix event id, globally unique.
    pub event_id: String,
    /// Authoritative message time, seconds resolution.
    pub timestamp: DateTime<Utc>,
    /// Free-text sender label.
    pub sender: String,
    /// Message body.
    pub body: String,
}

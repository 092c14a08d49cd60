//! Identifier newtypes and wire types for the Matrix client.

use serde::{Deserialize, Serialize};

/// msgtype of a plain text message.
pub const MSGTYPE_TEXT: &str = "m.text";

/// msgtype of a non-alerting notice.
pub const MSGTYPE_NOTICE: &str = "m.notice";

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque Matrix room identifier (e.g. `!abc:example.org`).
    RoomId
);
string_id!(
    /// Opaque Matrix event identifier.
    EventId
);
string_id!(
    /// Fully-qualified Matrix user identifier (e.g. `@user:example.org`).
    UserId
);

/// Content of an `m.room.message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    /// The message type (`m.text` or `m.notice`).
    pub msgtype: String,
    /// The message body.
    pub body: String,
}

impl MessageContent {
    /// A plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: MSGTYPE_TEXT.to_string(),
            body: body.into(),
        }
    }

    /// A non-alerting notice.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            msgtype: MSGTYPE_NOTICE.to_string(),
            body: body.into(),
        }
    }
}

/// Parameters for creating a room.
#[derive(Debug, Clone, Default)]
pub struct NewRoomSpec {
    /// Room display name.
    pub name: String,
    /// Room topic.
    pub topic: String,
    /// Users invited at creation.
    pub invite: Vec<UserId>,
    /// Whether the room is created as an `m.space`.
    pub as_space: bool,
}

/// Folded view of a room's current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomStateSummary {
    /// The room's display name, if set.
    pub name: Option<String>,
    /// Whether the room was created with type `m.space`.
    pub is_space: bool,
}

/// One `m.room.message` event delivered by `/sync`.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Room the event was sent into.
    pub room_id: RoomId,
    /// Event identifier.
    pub event_id: EventId,
    /// Sending user.
    pub sender: UserId,
    /// Message type (`m.text`, `m.notice`, `m.image`, ...).
    pub msgtype: String,
    /// Message body.
    pub body: String,
    /// Server timestamp in milliseconds.
    pub origin_server_ts: i64,
}

/// The useful slice of one `/sync` response.
#[derive(Debug, Clone)]
pub struct SyncBatch {
    /// Token to pass as `since` on the next call.
    pub next_batch: String,
    /// Message events across all joined rooms, in server order.
    pub events: Vec<InboundEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let room = RoomId::new("!abc:example.org");
        assert_eq!(
            serde_json::to_string(&room).unwrap(),
            "\"!abc:example.org\""
        );
        let back: RoomId = serde_json::from_str("\"!abc:example.org\"").unwrap();
        assert_eq!(back, room);
    }

    #[test]
    fn ids_display_as_raw_string() {
        let user = UserId::new("@admin:example.org");
        assert_eq!(user.to_string(), "@admin:example.org");
        assert_eq!(user.as_str(), "@admin:example.org");
    }

    #[test]
    fn message_content_constructors() {
        let text = MessageContent::text("hi");
        assert_eq!(text.msgtype, MSGTYPE_TEXT);
        let notice = MessageContent::notice("fyi");
        assert_eq!(notice.msgtype, MSGTYPE_NOTICE);
        assert_eq!(notice.body, "fyi");
    }
}

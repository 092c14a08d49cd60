//! Wire types for the Hostex API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Guest contact details attached to a conversation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Guest {
    /// Guest display name.
    #[serde(default)]
    pub name: String,
    /// Guest phone number, if shared.
    #[serde(default)]
    pub phone: String,
    /// Guest email, if shared.
    #[serde(default)]
    pub email: String,
}

/// One remote conversation thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    /// Stable remote identifier.
    pub id: String,
    /// Booking channel the guest came through (e.g. "Airbnb").
    #[serde(default)]
    pub channel_type: String,
    /// Time of the most recent message in the thread.
    pub last_message_at: DateTime<Utc>,
    /// Guest details.
    #[serde(default)]
    pub guest: Guest,
    /// Title of the property the booking is for.
    #[serde(default)]
    pub property_title: String,
    /// Check-in date (opaque string from the API).
    #[serde(default)]
    pub check_in_date: String,
    /// Check-out date (opaque string from the API).
    #[serde(default)]
    pub check_out_date: String,
}

/// One message inside a conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMessage {
    /// Remote message identifier.
    pub id: String,
    /// Message text.
    pub content: String,
    /// Authoritative message time.
    pub timestamp: DateTime<Utc>,
    /// Free-text sender label.
    pub sender: String,
}

/// Response envelope common to all Hostex endpoints.
///
/// `error_code` is 200 on success even though the payload shape varies;
/// anything else carries `error_msg`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    #[allow(dead_code)]
    pub request_id: String,
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
    pub data: Option<T>,
}

/// Payload of the conversation-list endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ConversationsData {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

/// Payload of the message-list endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct MessagesData {
    #[serde(default)]
    pub messages: Vec<RemoteMessage>,
}

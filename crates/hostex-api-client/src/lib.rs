//! HTTP client for the Hostex property-management messaging API.
//!
//! Stateless request/response wrapper around three operations: listing
//! conversations, listing messages newer than a cursor, and sending a
//! message into a conversation. Every call authenticates with a static
//! `Hostex-Access-Token` header; the API wraps payloads in an envelope
//! whose `error_code` can signal failure even on HTTP 200.

mod client;
mod error;
mod types;

pub use client::HostexClient;
pub use error::{HostexError, HostexResult};
pub use types::{Conversation, Guest, RemoteMessage};

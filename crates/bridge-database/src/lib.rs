//! SQLite persistence layer for the Hostex bridge.
//!
//! This crate provides:
//! - An async SQLite executor backed by a dedicated thread
//! - Versioned schema migrations
//! - Model types for the three bridged entities (portal, message, user link)
//! - Query helpers, all of whose writes are upserts (no deletes)
//!
//! # Architecture
//!
//! `BridgeDb` wraps a `tokio_rusqlite::Connection`: every query is sent to a
//! single background thread and executed in FIFO order, so callers never
//! block the Tokio runtime and SQLite's single-writer model is respected.
//!
//! ```ignore
//! let db = BridgeDb::open(path).await?;
//! let room = db
//!     .call(|conn| queries::portal_room_id(conn, "conv-1"))
//!     .await?;
//! ```
//!
//! Only SQL should run inside `call()`; anything heavier belongs outside.

mod db;
mod error;
mod migrations;
mod models;
pub mod queries;

pub use db::BridgeDb;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::run_migrations;
pub use models::{MessageRecord, PortalRecord};

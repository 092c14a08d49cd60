//! Query helpers for the bridge tables.
//!
//! Free functions over a `&rusqlite::Connection`, intended to run inside
//! [`BridgeDb::call`](crate::BridgeDb::call). All writes are upserts; nothing
//! here deletes rows.

use crate::{DatabaseResult, MessageRecord, PortalRecord};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};

// ==========================================
// Portals
// ==========================================

/// Insert or update a portal mapping, keyed by conversation id.
pub fn upsert_portal(conn: &Connection, portal: &PortalRecord) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO portals (conversation_id, room_id, name, topic, avatar_url, encrypted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (conversation_id) DO UPDATE SET
             room_id = excluded.room_id,
             name = excluded.name,
             topic = excluded.topic,
             avatar_url = excluded.avatar_url,
             encrypted = excluded.encrypted",
        params![
            portal.conversation_id,
            portal.room_id,
            portal.name,
            portal.topic,
            portal.avatar_url,
            portal.encrypted,
        ],
    )?;
    Ok(())
}

/// Get the room id persisted for a conversation, if any.
pub fn portal_room_id(conn: &Connection, conversation_id: &str) -> DatabaseResult<Option<String>> {
    let result = conn.query_row(
        "SELECT room_id FROM portals WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get::<_, Option<String>>(0),
    );

    match result {
        Ok(room_id) => Ok(room_id),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all persisted portal mappings.
pub fn load_portals(conn: &Connection) -> DatabaseResult<Vec<PortalRecord>> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, room_id, name, topic, avatar_url, encrypted
         FROM portals ORDER BY conversation_id",
    )?;

    let portals = stmt
        .query_map([], |row| {
            Ok(PortalRecord {
                conversation_id: row.get(0)?,
                room_id: row.get(1)?,
                name: row.get(2)?,
                topic: row.get(3)?,
                avatar_url: row.get(4)?,
                encrypted: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(portals)
}

/// Count portals that have a room assigned.
pub fn bridged_portal_count(conn: &Connection) -> DatabaseResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM portals WHERE room_id IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ==========================================
// Messages
// ==========================================

/// Insert a relayed message, ignoring duplicates.
///
/// Returns true when a row was actually inserted. A second insert with the
/// same `(conversation_id, event_id)` leaves the table unchanged.
pub fn insert_message(conn: &Connection, message: &MessageRecord) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "INSERT INTO messages (conversation_id, event_id, timestamp, sender, body)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (conversation_id, event_id) DO NOTHING",
        params![
            message.conversation_id,
            message.event_id,
            message.timestamp.timestamp(),
            message.sender,
            message.body,
        ],
    )?;
    Ok(changed > 0)
}

/// Get the backfill cursor: the newest stored message timestamp for a
/// conversation, or None when nothing has been relayed yet.
pub fn last_message_timestamp(
    conn: &Connection,
    conversation_id: &str,
) -> DatabaseResult<Option<DateTime<Utc>>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(timestamp) FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;

    Ok(max.and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
}

// ==========================================
// User links
// ==========================================

/// Associate a Matrix user with a remote identity (last write wins).
///
/// Stored for compatibility with the original schema; command authorization
/// does not consult this table.
pub fn upsert_user_link(
    conn: &Connection,
    matrix_user_id: &str,
    remote_id: &str,
) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO users (matrix_user_id, remote_id)
         VALUES (?1, ?2)
         ON CONFLICT (matrix_user_id) DO UPDATE SET remote_id = excluded.remote_id",
        params![matrix_user_id, remote_id],
    )?;
    Ok(())
}

/// Get the remote identity linked to a Matrix user, if any.
pub fn user_link(conn: &Connection, matrix_user_id: &str) -> DatabaseResult<Option<String>> {
    let result = conn.query_row(
        "SELECT remote_id FROM users WHERE matrix_user_id = ?1",
        params![matrix_user_id],
        |row| row.get(0),
    );

    match result {
        Ok(remote_id) => Ok(Some(remote_id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

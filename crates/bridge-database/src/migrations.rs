//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_initial_schema(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Initial schema - portals, messages, users.
fn migrate_v1_initial_schema(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: initial schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS portals (
            conversation_id TEXT PRIMARY KEY,
            room_id TEXT UNIQUE,
            name TEXT,
            topic TEXT,
            avatar_url TEXT,
            encrypted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL,
            event_id TEXT NOT NULL UNIQUE,
            timestamp INTEGER NOT NULL,
            sender TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (conversation_id, event_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation_timestamp
            ON messages(conversation_id, timestamp);

        CREATE TABLE IF NOT EXISTS users (
            matrix_user_id TEXT PRIMARY KEY,
            remote_id TEXT UNIQUE
        );
        ",
    )?;

    record_migration(conn, 1, "initial_schema")
}

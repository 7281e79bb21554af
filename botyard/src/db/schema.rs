//! Database schema definitions.
//!
//! `bot_containers` holds one row per provisioned container. `bots` mirrors
//! the bot's own lifecycle and is touched together with its container when
//! the container stops.

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Container record table.
///
/// Soft-deleted rows keep their data with `state = 'deleted'` and a
/// `deleted_at` stamp. The partial unique index allows at most one live row
/// per (bot_id, project_id, user_id).
pub const BOT_CONTAINERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS bot_containers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_name TEXT NOT NULL,
    port INTEGER NOT NULL,
    container_id TEXT NOT NULL,
    bot_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    icon TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL CHECK (state IN ('created', 'running', 'stopped', 'deleted')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_bot_containers_owner_live
    ON bot_containers(bot_id, project_id, user_id) WHERE state <> 'deleted';
CREATE INDEX IF NOT EXISTS idx_bot_containers_container_id ON bot_containers(container_id);
CREATE INDEX IF NOT EXISTS idx_bot_containers_state ON bot_containers(state);
"#;

/// Bot table. Rows are upserted when a container for the bot is created.
pub const BOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS bots (
    id INTEGER PRIMARY KEY NOT NULL,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Get all schema creation statements.
pub fn all_schemas() -> Vec<&'static str> {
    vec![SCHEMA_VERSION_TABLE, BOT_CONTAINERS_TABLE, BOTS_TABLE]
}

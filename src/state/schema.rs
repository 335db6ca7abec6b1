//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the colony state database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Key-value store for runtime bookkeeping
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Bot population
CREATE TABLE IF NOT EXISTS bots (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    name                 TEXT NOT NULL UNIQUE,
    full_name            TEXT NOT NULL DEFAULT '',
    avatar               TEXT NOT NULL DEFAULT '',
    age                  INTEGER NOT NULL DEFAULT 18,
    gender               TEXT NOT NULL DEFAULT 'Male',
    category             TEXT NOT NULL,
    prompt               TEXT NOT NULL DEFAULT '',
    description          TEXT NOT NULL DEFAULT '',
    like_probability     REAL NOT NULL,
    comment_probability  REAL NOT NULL,
    follow_probability   REAL NOT NULL,
    unfollow_probability REAL NOT NULL,
    repost_probability   REAL NOT NULL,
    created_at           TEXT NOT NULL DEFAULT (datetime('now')),
    last_active          TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only activity ledger (dedup enforced by the decision engine)
CREATE TABLE IF NOT EXISTS activities (
    id            TEXT PRIMARY KEY,
    bot_id        INTEGER NOT NULL REFERENCES bots(id),
    activity_type TEXT NOT NULL,
    target_id     TEXT NOT NULL,
    content       TEXT,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Bot memories (comment context)
CREATE TABLE IF NOT EXISTS memories (
    id           TEXT PRIMARY KEY,
    bot_id       INTEGER NOT NULL REFERENCES bots(id),
    content      TEXT NOT NULL,
    context_type TEXT NOT NULL,
    context_id   TEXT NOT NULL,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Posts already handed to the fan-out scheduler
CREATE TABLE IF NOT EXISTS seen_posts (
    post_id    TEXT PRIMARY KEY,
    first_seen TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_bots_category ON bots(category);
CREATE INDEX IF NOT EXISTS idx_activities_dedup ON activities(bot_id, activity_type, target_id);
CREATE INDEX IF NOT EXISTS idx_activities_created ON activities(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_context ON memories(bot_id, context_type, context_id);
"#;

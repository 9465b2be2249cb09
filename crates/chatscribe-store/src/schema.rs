//! Database schema SQL.

/// Identities, targets, and the two append-only record tables.
///
/// Timestamps are milliseconds since the Unix epoch.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    handle TEXT NOT NULL UNIQUE,
    first_seen INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    platform TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (identity_id, platform)
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL REFERENCES targets(id),
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    body TEXT NOT NULL,
    observed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS viewer_appearances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_id INTEGER NOT NULL REFERENCES targets(id),
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    observed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_target_time ON chat_messages(target_id, observed_at);
CREATE INDEX IF NOT EXISTS idx_chat_time ON chat_messages(observed_at);
CREATE INDEX IF NOT EXISTS idx_viewers_target_time ON viewer_appearances(target_id, observed_at);
"#;

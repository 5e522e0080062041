//! v001 -- Initial schema creation.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Actors (everyone who ever talked to the engine)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS actors (
    actor_id   INTEGER PRIMARY KEY NOT NULL,  -- platform user id
    first_name TEXT,
    last_name  TEXT,
    username   TEXT,
    lang       TEXT,                          -- "ru" / "uk", NULL = default
    created_at TEXT NOT NULL,                 -- RFC-3339
    updated_at TEXT NOT NULL
);

-- Role tiers.  Membership rows only; the owner tier comes from config.
CREATE TABLE IF NOT EXISTS admins (
    actor_id INTEGER PRIMARY KEY NOT NULL,
    role     TEXT NOT NULL DEFAULT 'admin',  -- 'admin' / 'superadmin'
    added_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS allowed_actors (
    actor_id INTEGER PRIMARY KEY NOT NULL,
    added_by INTEGER NOT NULL,
    added_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Group registrations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_registrations (
    chat_id          INTEGER PRIMARY KEY NOT NULL,
    title            TEXT NOT NULL,
    subject_group_id TEXT NOT NULL,           -- 10 ASCII digits
    registered_by    INTEGER NOT NULL,
    registered_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_group_registrations_subject
    ON group_registrations(subject_group_id, registered_at DESC);

-- ----------------------------------------------------------------
-- Indexed messages and their subject links
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id             INTEGER NOT NULL,
    platform_message_id INTEGER NOT NULL,
    sender_id           INTEGER,
    sender_username     TEXT,
    text                TEXT NOT NULL,
    media_kind          TEXT NOT NULL DEFAULT 'text',
    media_ref           TEXT,                 -- platform file reference
    is_forward          INTEGER NOT NULL DEFAULT 0,
    sent_at             TEXT NOT NULL,

    UNIQUE (chat_id, platform_message_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at DESC);

CREATE TABLE IF NOT EXISTS message_subjects (
    message_id    INTEGER NOT NULL,           -- FK -> messages(id)
    subject_token TEXT NOT NULL,              -- 10 ASCII digits

    UNIQUE (message_id, subject_token),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_message_subjects_token
    ON message_subjects(subject_token);

-- ----------------------------------------------------------------
-- Guard state: quota events, spacing stamps, bans
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS quota_events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id   INTEGER NOT NULL,
    kind       TEXT NOT NULL,                 -- "search" / "report-send" / "legend-view"
    detail     TEXT,                          -- e.g. the searched token
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quota_events_actor
    ON quota_events(actor_id, kind, created_at);

CREATE TABLE IF NOT EXISTS action_stamps (
    actor_id       INTEGER PRIMARY KEY NOT NULL,
    last_action_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bans (
    actor_id INTEGER PRIMARY KEY NOT NULL,
    until    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Legends: one canonical document per subject-group id
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS legends (
    subject_group_id  TEXT PRIMARY KEY NOT NULL,
    source_chat_id    INTEGER NOT NULL,
    content           TEXT NOT NULL,
    source_message_id INTEGER,                -- last broadcast message
    updated_at        TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Settings and audit
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id   INTEGER NOT NULL,
    action     TEXT NOT NULL,
    target     TEXT NOT NULL,
    details    TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

//! `SQLite` schema definitions for sirenrec.
//!
//! This module contains the SQL statements for creating and managing
//! the alert metadata schema.

/// SQL statement to create the alerts table.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT
)
";

/// SQL statement to create the chunks table (child collection of an alert).
pub const CREATE_CHUNKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id TEXT NOT NULL REFERENCES alerts(id),
    sequence_index INTEGER NOT NULL,
    remote_key TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    content_type TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    UNIQUE (alert_id, sequence_index)
)
";

/// SQL statement to create an index on alert start time for listing.
pub const CREATE_STARTED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_started ON alerts(started_at DESC)
";

/// SQL statement to create an index on alert owner.
pub const CREATE_OWNER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_alerts_owner ON alerts(owner)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ALERTS_TABLE,
    CREATE_CHUNKS_TABLE,
    CREATE_STARTED_INDEX,
    CREATE_OWNER_INDEX,
    CREATE_METADATA_TABLE,
];

//! Alert metadata storage.
//!
//! The [`MetadataStore`] trait is what the recorder needs from a metadata
//! backend: create an alert, update it, append chunk records to it. The
//! [`SqliteMetadataStore`] implements it on a local `SQLite` database and adds
//! the read side used by the CLI.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::alert::{Alert, AlertId, AlertStatus, AlertUpdate, Chunk, NewChunk, UserId};
use crate::error::{Error, Result};

/// Backend that persists alerts and their chunk records.
///
/// Timestamps and alert ids are assigned by the store, not the caller.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create a new alert in the `recording` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    async fn create_alert(&self, owner: &UserId) -> Result<Alert>;

    /// Apply `update` to an existing alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlertNotFound`] for unknown ids and
    /// [`Error::StatusRegression`] when a completed alert would go back to
    /// recording.
    async fn update_alert(&self, id: &AlertId, update: AlertUpdate) -> Result<Alert>;

    /// Append a chunk record to an alert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlertNotFound`] for unknown alerts, or a database
    /// error if the sequence index is already taken.
    async fn add_chunk(&self, alert_id: &AlertId, chunk: NewChunk) -> Result<Chunk>;
}

/// Summary counts for the metadata database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of alerts.
    pub total_alerts: i64,
    /// Alerts still in the `recording` state.
    pub recording_alerts: i64,
    /// Number of chunk records.
    pub total_chunks: i64,
    /// Sum of uploaded chunk sizes.
    pub total_bytes: i64,
    /// Size of the database file (0 for in-memory).
    pub db_size_bytes: u64,
}

/// `SQLite`-backed metadata store.
///
/// Clones share the connection. The inherent methods block on the
/// connection; the [`MetadataStore`] impl runs them on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Arc<Mutex<Connection>>,
    /// Mixed into generated alert ids.
    id_counter: Arc<AtomicU64>,
}

const ALERT_COLUMNS: &str = "id, owner, status, started_at, completed_at";
const CHUNK_COLUMNS: &str =
    "alert_id, sequence_index, remote_key, size_bytes, content_hash, content_type, uploaded_at";

impl SqliteMetadataStore {
    /// Open or create a metadata database at the given path.
    ///
    /// Creates the parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self::with_connection(path, conn))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self::with_connection(PathBuf::from(":memory:"), conn))
    }

    fn with_connection(path: PathBuf, conn: Connection) -> Self {
        Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
            id_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("metadata connection lock poisoned"))
    }

    /// Generate an opaque alert id.
    fn next_alert_id(&self, owner: &UserId, at: DateTime<Utc>) -> AlertId {
        let counter = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = blake3::Hasher::new();
        hasher.update(owner.as_str().as_bytes());
        hasher.update(&at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(&counter.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        AlertId::new(&hex.as_str()[..20])
    }

    /// Create a new alert in the `recording` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_alert(&self, owner: &UserId) -> Result<Alert> {
        let started_at = now();
        let id = self.next_alert_id(owner, started_at);

        self.conn()?.execute(
            "INSERT INTO alerts (id, owner, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.as_str(),
                owner.as_str(),
                AlertStatus::Recording.to_string(),
                format_timestamp(started_at),
            ],
        )?;

        debug!(alert_id = %id, owner = %owner, "Created alert");
        Ok(Alert {
            id,
            owner: owner.clone(),
            status: AlertStatus::Recording,
            started_at,
            completed_at: None,
        })
    }

    /// Apply an update to an alert, keeping its status monotonic.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert is unknown, the update would regress its
    /// status, or the database operation fails.
    pub fn apply_update(&self, id: &AlertId, update: AlertUpdate) -> Result<Alert> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                [id.as_str()],
                row_to_alert,
            )
            .optional()?
            .ok_or_else(|| Error::AlertNotFound {
                id: id.to_string(),
            })?;

        let mut updated = current.clone();
        if let Some(status) = update.status {
            if !current.status.can_become(status) {
                return Err(Error::StatusRegression { id: id.to_string() });
            }
            if status == AlertStatus::Completed && current.completed_at.is_none() {
                updated.completed_at = Some(now());
            }
            updated.status = status;
        }

        if updated != current {
            tx.execute(
                "UPDATE alerts SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![
                    updated.status.to_string(),
                    updated.completed_at.map(format_timestamp),
                    id.as_str(),
                ],
            )?;
        }
        tx.commit()?;

        debug!(alert_id = %id, status = %updated.status, "Updated alert");
        Ok(updated)
    }

    /// Append a chunk record to an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the alert is unknown or the database operation fails.
    pub fn insert_chunk(&self, alert_id: &AlertId, chunk: NewChunk) -> Result<Chunk> {
        let conn = self.conn()?;

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM alerts WHERE id = ?1",
                [alert_id.as_str()],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(Error::AlertNotFound {
                id: alert_id.to_string(),
            });
        }

        let size_bytes = i64::try_from(chunk.size_bytes)
            .map_err(|_| Error::internal(format!("chunk size {} out of range", chunk.size_bytes)))?;
        let uploaded_at = now();
        conn.execute(
            &format!("INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                alert_id.as_str(),
                chunk.sequence_index,
                chunk.remote_key,
                size_bytes,
                chunk.content_hash,
                chunk.content_type,
                format_timestamp(uploaded_at),
            ],
        )?;

        debug!(
            alert_id = %alert_id,
            sequence = chunk.sequence_index,
            "Recorded chunk"
        );
        Ok(Chunk {
            alert_id: alert_id.clone(),
            sequence_index: chunk.sequence_index,
            remote_key: chunk.remote_key,
            size_bytes: chunk.size_bytes,
            content_hash: chunk.content_hash,
            content_type: chunk.content_type,
            uploaded_at,
        })
    }

    /// Get an alert by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_alert(&self, id: &AlertId) -> Result<Option<Alert>> {
        let alert = self
            .conn()?
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                [id.as_str()],
                row_to_alert,
            )
            .optional()?;
        Ok(alert)
    }

    /// Get the most recently started alerts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY started_at DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let alerts = stmt
            .query_map([limit_i64], row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// Get the chunk records of an alert in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_chunks(&self, alert_id: &AlertId) -> Result<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE alert_id = ?1 ORDER BY sequence_index ASC"
        ))?;

        let chunks = stmt
            .query_map([alert_id.as_str()], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let (total_alerts, recording_alerts): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = ?1), 0) FROM alerts",
            [AlertStatus::Recording.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (total_chunks, total_bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM chunks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            total_alerts,
            recording_alerts,
            total_chunks,
            total_bytes,
            db_size_bytes,
        })
    }
}

#[async_trait::async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_alert(&self, owner: &UserId) -> Result<Alert> {
        let owner = owner.clone();
        self.run_blocking(move |store| store.insert_alert(&owner))
            .await
    }

    async fn update_alert(&self, id: &AlertId, update: AlertUpdate) -> Result<Alert> {
        let id = id.clone();
        self.run_blocking(move |store| store.apply_update(&id, update))
            .await
    }

    async fn add_chunk(&self, alert_id: &AlertId, chunk: NewChunk) -> Result<Chunk> {
        let alert_id = alert_id.clone();
        self.run_blocking(move |store| store.insert_chunk(&alert_id, chunk))
            .await
    }
}

impl SqliteMetadataStore {
    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::internal(format!("metadata task failed: {e}")))?
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        })
}

fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let started_at_str: String = row.get(3)?;
    let completed_at_str: Option<String> = row.get(4)?;

    let status = status_str.parse::<AlertStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(Alert {
        id: AlertId::new(id),
        owner: UserId::new(owner),
        status,
        started_at: parse_timestamp(3, &started_at_str)?,
        completed_at: completed_at_str
            .map(|s| parse_timestamp(4, &s))
            .transpose()?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let size_bytes = u64::try_from(row.get::<_, i64>(3)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e)))?;
    let uploaded_at_str: String = row.get(6)?;
    Ok(Chunk {
        alert_id: AlertId::new(row.get::<_, String>(0)?),
        sequence_index: row.get(1)?,
        remote_key: row.get(2)?,
        size_bytes,
        content_hash: row.get(4)?,
        content_type: row.get(5)?,
        uploaded_at: parse_timestamp(6, &uploaded_at_str)?,
    })
}
